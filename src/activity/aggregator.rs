use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::chain::{Address, EventSource, WorkEvent};
use crate::error::MinerError;

/// Submission counts per miner, in the order miners were first seen.
#[derive(Debug, Default, Clone)]
pub struct Leaderboard {
    entries: Vec<(Address, u64)>,
    index: HashMap<Address, usize>,
}

impl Leaderboard {
    fn increment(&mut self, miner: Address) {
        match self.index.get(&miner) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(miner, self.entries.len());
                self.entries.push((miner, 1));
            }
        }
    }

    pub fn count(&self, miner: &Address) -> u64 {
        self.index.get(miner).map_or(0, |&i| self.entries[i].1)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Top `limit` miners by count. Ties keep first-seen order.
    pub fn ranking(&self, limit: usize) -> Vec<(Address, u64)> {
        let mut ranked = self.entries.clone();
        // `sort_by` is stable, so equal counts stay in insertion order.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }
}

/// History log and leaderboard derived from `WorkSubmitted` events.
#[derive(Debug, Default)]
pub struct ActivityAggregator {
    /// Newest first.
    history: VecDeque<WorkEvent>,
    leaderboard: Leaderboard,
}

impl ActivityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all state with a chronological backfill.
    pub fn seed_historical(&mut self, events: Vec<WorkEvent>) {
        let mut leaderboard = Leaderboard::default();
        for event in &events {
            leaderboard.increment(event.miner);
        }
        let history: VecDeque<WorkEvent> = events.into_iter().rev().collect();

        debug!(
            "ACTIVITY - seeded {} events from {} miners",
            history.len(),
            leaderboard.len()
        );
        self.history = history;
        self.leaderboard = leaderboard;
    }

    /// Record one live event. History and leaderboard change together.
    pub fn on_live_event(&mut self, event: WorkEvent) {
        self.leaderboard.increment(event.miner);
        self.history.push_front(event);
    }

    pub fn history(&self) -> &VecDeque<WorkEvent> {
        &self.history
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }
}

/// Fetch the chronological backfill for `[from_block, to_block]`.
pub async fn load_historical<S>(
    source: &S,
    from_block: u64,
    to_block: Option<u64>,
) -> Result<Vec<WorkEvent>, MinerError>
where
    S: EventSource + ?Sized,
{
    source
        .query_work_events(from_block, to_block)
        .await
        .map_err(|e| MinerError::EventSource(e.to_string()))
}

#[cfg(test)]
mod tests {
    use primitive_types::{H256, U256};

    use super::*;
    use crate::chain::memory::tests::{funded_chain, valid_nonce};
    use crate::chain::{ChainWriter, MemoryChain};
    use crate::activity::LEADERBOARD_SIZE;

    fn event(miner: u8, nonce: u64) -> WorkEvent {
        WorkEvent {
            miner: Address::repeat_byte(miner),
            nonce: U256::from(nonce),
            hash: H256::from_low_u64_be(nonce),
            reward: U256::from(5u64),
        }
    }

    #[test]
    fn backfill_then_live_is_newest_first() {
        let (a, b, c, d, e) = (
            event(1, 1),
            event(2, 2),
            event(1, 3),
            event(3, 4),
            event(1, 5),
        );
        let mut agg = ActivityAggregator::new();
        agg.seed_historical(vec![a.clone(), b.clone(), c.clone()]);
        agg.on_live_event(d.clone());
        agg.on_live_event(e.clone());

        assert!(agg.history().iter().eq([&e, &d, &c, &b, &a]));
        let lb = agg.leaderboard();
        assert_eq!(lb.total(), 5);
        assert_eq!(lb.count(&Address::repeat_byte(1)), 3);
        assert_eq!(lb.count(&Address::repeat_byte(2)), 1);
        assert_eq!(lb.count(&Address::repeat_byte(3)), 1);
    }

    #[test]
    fn counts_always_sum_to_history_length() {
        let mut agg = ActivityAggregator::new();
        agg.seed_historical((0..7).map(|i| event((i % 3) as u8, i)).collect());
        for i in 7..20 {
            agg.on_live_event(event((i % 4) as u8, i));
            assert_eq!(agg.leaderboard().total(), agg.history().len() as u64);
        }
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let mut agg = ActivityAggregator::new();
        agg.seed_historical(vec![event(9, 1), event(4, 2), event(7, 3)]);
        agg.on_live_event(event(7, 4));
        agg.on_live_event(event(4, 5));

        let ranking = agg.leaderboard().ranking(LEADERBOARD_SIZE);
        let order: Vec<_> = ranking.iter().map(|(m, c)| (m.0[0], *c)).collect();
        assert_eq!(order, vec![(4, 2), (7, 2), (9, 1)]);
    }

    #[test]
    fn ranking_is_truncated_but_map_is_not() {
        let mut agg = ActivityAggregator::new();
        agg.seed_historical((0..15u8).map(|i| event(i, i as u64)).collect());
        assert_eq!(agg.leaderboard().ranking(LEADERBOARD_SIZE).len(), 10);
        assert_eq!(agg.leaderboard().len(), 15);
    }

    #[test]
    fn reseeding_replaces_previous_session() {
        let mut agg = ActivityAggregator::new();
        agg.seed_historical(vec![event(1, 1)]);
        agg.on_live_event(event(2, 2));
        agg.seed_historical(vec![event(3, 3)]);
        assert!(agg.history().iter().eq([&event(3, 3)]));
        assert_eq!(agg.leaderboard().total(), 1);
    }

    #[tokio::test]
    async fn loads_from_event_source() {
        let chain = funded_chain(1);
        let miner = Address::repeat_byte(0x42);
        for _ in 0..2 {
            let nonce = valid_nonce(&chain, miner).await;
            let pending = chain.submit_work(miner, nonce).await.unwrap();
            chain.wait_for(pending).await.unwrap();
        }
        let events = load_historical(&chain, 0, None).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn event_source_failure_is_distinct() {
        let chain = MemoryChain::new(Address::zero(), U256::one(), U256::zero(), U256::zero());
        chain.set_offline(true);
        let err = load_historical(&chain, 0, None).await.unwrap_err();
        assert!(matches!(err, MinerError::EventSource(_)));
    }
}
