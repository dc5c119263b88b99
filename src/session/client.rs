use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use primitive_types::U256;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChainView, Wallet};
use crate::activity::{ActivityAggregator, SeenEvents, load_historical};
use crate::chain::{Address, Chain, WorkEvent, format_address, format_ether, parse_ether};
use crate::error::{BlockReason, MinerError};
use crate::pow::{Difficulty, SearchOutcome, search};
use crate::submission::{Accepted, SubmissionAttempt, SubmissionLifecycle};

/// Live subscription handed back by [`MinerClient::subscribe_activity`].
pub struct LiveFeed {
    generation: u64,
    rx: mpsc::UnboundedReceiver<WorkEvent>,
}

#[derive(Debug, Default)]
struct Activity {
    aggregator: ActivityAggregator,
    seen: SeenEvents,
}

/// One user's mining session against a proof-of-work contract.
///
/// Owns the cached chain view, the submission lifecycle and the activity
/// aggregate; components never reach into each other's state.
pub struct MinerClient {
    chain: Arc<dyn Chain>,
    wallet: Arc<dyn Wallet>,
    view: Mutex<ChainView>,
    lifecycle: SubmissionLifecycle,
    activity: Mutex<Activity>,
    /// Running search, tagged with its id.
    search: Mutex<Option<(u64, CancellationToken)>>,
    search_seq: AtomicU64,
    feed_generation: AtomicU64,
    history_from_block: u64,
}

impl MinerClient {
    pub fn new(chain: Arc<dyn Chain>, wallet: Arc<dyn Wallet>, history_from_block: u64) -> Self {
        Self {
            chain,
            wallet,
            view: Mutex::new(ChainView::default()),
            lifecycle: SubmissionLifecycle::default(),
            activity: Mutex::new(Activity::default()),
            search: Mutex::new(None),
            search_seq: AtomicU64::new(0),
            feed_generation: AtomicU64::new(0),
            history_from_block,
        }
    }

    pub fn view(&self) -> ChainView {
        self.view.lock().expect("mutex poisoned").clone()
    }

    pub fn attempt(&self) -> SubmissionAttempt {
        self.lifecycle.snapshot()
    }

    pub fn history(&self) -> Vec<WorkEvent> {
        let activity = self.activity.lock().expect("mutex poisoned");
        activity.aggregator.history().iter().cloned().collect()
    }

    pub fn ranking(&self, limit: usize) -> Vec<(Address, u64)> {
        let activity = self.activity.lock().expect("mutex poisoned");
        activity.aggregator.leaderboard().ranking(limit)
    }

    /// One second of logical time for cooldown and message timers.
    pub fn tick(&self) {
        self.lifecycle.tick();
    }

    pub fn set_nonce_input(&self, nonce: impl Into<String>) {
        self.lifecycle.set_nonce_input(nonce);
    }

    /// Open the wallet session, read contract state and start the activity
    /// feed. If only the feed fails the session stays connected and the
    /// `EventSource` error is returned; retry with
    /// [`MinerClient::subscribe_activity`].
    pub async fn connect(&self) -> Result<LiveFeed, MinerError> {
        let account = self.wallet.connect().await?;
        let chain = &self.chain;
        let (owner, difficulty, last_hash, reward, balance) = tokio::try_join!(
            chain.owner(),
            chain.difficulty(),
            chain.last_hash(),
            chain.reward_amount(),
            chain.balance(),
        )?;
        let difficulty = Difficulty::new(difficulty)?;

        {
            let mut view = self.view.lock().expect("mutex poisoned");
            *view = ChainView {
                account: Some(account),
                owner: Some(owner),
                difficulty,
                last_hash: Some(last_hash),
                reward,
                balance,
            };
        }
        info!(
            "SESSION - connected {} (owner={}, difficulty={}, reward={} ETH, balance={} ETH)",
            format_address(&account),
            format_address(&owner),
            difficulty,
            format_ether(reward),
            format_ether(balance)
        );

        self.subscribe_activity().await
    }

    /// Subscribe to live events, then rebuild history from the backfill.
    ///
    /// Subscribing first means nothing is missed in between; anything that
    /// shows up in both is dropped by the pump. Existing history is kept if
    /// either step fails.
    pub async fn subscribe_activity(&self) -> Result<LiveFeed, MinerError> {
        let rx = self
            .chain
            .subscribe()
            .await
            .map_err(|e| MinerError::EventSource(e.to_string()))?;
        let events = load_historical(self.chain.as_ref(), self.history_from_block, None).await?;

        let generation = self.feed_generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut activity = self.activity.lock().expect("mutex poisoned");
            activity.seen.reset(&events);
            activity.aggregator.seed_historical(events);
        }
        debug!("SESSION - activity feed generation {}", generation);
        Ok(LiveFeed { generation, rx })
    }

    /// Drain `feed` in arrival order until it closes or a newer feed replaces it.
    pub async fn pump_live_events(self: Arc<Self>, mut feed: LiveFeed) {
        while let Some(event) = feed.rx.recv().await {
            if self.feed_generation.load(Ordering::SeqCst) != feed.generation {
                break;
            }
            self.on_live_event(event).await;
        }
        debug!("SESSION - activity feed {} stopped", feed.generation);
    }

    /// Apply one live event. Returns `false` for a redelivered event.
    pub async fn on_live_event(&self, event: WorkEvent) -> bool {
        {
            let mut activity = self.activity.lock().expect("mutex poisoned");
            if !activity.seen.insert(&event) {
                debug!(
                    "SESSION - dropping redelivered event from {} nonce {}",
                    format_address(&event.miner),
                    event.nonce
                );
                return false;
            }
            activity.aggregator.on_live_event(event.clone());
        }
        info!(
            "SESSION - work by {} nonce {} reward {} ETH",
            format_address(&event.miner),
            event.nonce,
            format_ether(event.reward)
        );

        {
            // The accepted hash is the seed of the next round.
            let mut view = self.view.lock().expect("mutex poisoned");
            if view.connected() {
                view.last_hash = Some(event.hash);
            }
        }
        match self.chain.balance().await {
            Ok(balance) => {
                let mut view = self.view.lock().expect("mutex poisoned");
                if view.connected() {
                    view.balance = balance;
                }
            }
            Err(e) => warn!("SESSION - balance refresh failed: {}", e),
        }
        true
    }

    /// Close the session. History and leaderboard stay until the next connect.
    pub async fn disconnect(&self) {
        self.cancel_search();
        self.feed_generation.fetch_add(1, Ordering::SeqCst);
        *self.view.lock().expect("mutex poisoned") = ChainView::default();
        self.lifecycle.clear_input();
        self.wallet.disconnect().await;
        info!("SESSION - disconnected");
    }

    fn require_account(&self) -> Result<Address, MinerError> {
        self.view
            .lock()
            .expect("mutex poisoned")
            .account
            .ok_or(MinerError::PreconditionBlocked(BlockReason::NoSession))
    }

    fn require_privileged(&self) -> Result<Address, MinerError> {
        let account = self.require_account()?;
        if !self.view.lock().expect("mutex poisoned").is_privileged() {
            return Err(MinerError::NotPrivileged);
        }
        Ok(account)
    }

    /// Search for a nonce the contract will accept from this account and put
    /// it into the submission input. Owner only.
    pub async fn auto_find(&self, start_nonce: Option<U256>) -> Result<U256, MinerError> {
        let account = self.require_privileged()?;
        let (last_hash, difficulty) = {
            let view = self.view.lock().expect("mutex poisoned");
            (view.last_hash, view.difficulty)
        };
        let base_hash = match last_hash {
            Some(hash) => hash,
            None => {
                let hash = self.chain.last_hash().await?;
                self.view.lock().expect("mutex poisoned").last_hash = Some(hash);
                hash
            }
        };

        let id = self.search_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self
            .search
            .lock()
            .expect("mutex poisoned")
            .replace((id, token.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        let mut guard = SearchGuard {
            client: self,
            id,
            finished: false,
        };
        self.lifecycle.report("Searching for valid nonce…");

        let outcome = search(base_hash, account, difficulty.target(), start_nonce, &token).await;
        guard.finished = true;
        let replaced = self
            .search
            .lock()
            .expect("mutex poisoned")
            .as_ref()
            .is_some_and(|(current, _)| *current != id);
        drop(guard);

        match outcome {
            SearchOutcome::Found { nonce, .. } => {
                self.lifecycle.set_nonce_input(nonce.to_string());
                self.lifecycle.report(format!("Found nonce {nonce}."));
                Ok(nonce)
            }
            SearchOutcome::Cancelled { resume_from, .. } => {
                if !replaced {
                    self.lifecycle.report("Search cancelled");
                }
                Err(MinerError::SearchCancelled { resume_from })
            }
        }
    }

    /// Abandon the running search, if any.
    pub fn cancel_search(&self) -> bool {
        match self.search.lock().expect("mutex poisoned").take() {
            Some((id, token)) => {
                debug!("SEARCH - cancel requested for search {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Submit the current input, or `nonce` if given.
    pub async fn submit(&self, nonce: Option<String>) -> Result<Accepted, MinerError> {
        if let Some(nonce) = nonce {
            self.lifecycle.set_nonce_input(nonce);
        }
        let account = self.view.lock().expect("mutex poisoned").account;
        let accepted = self.lifecycle.submit(account, self.chain.as_ref()).await?;
        if let Some(hash) = accepted.last_hash {
            self.view.lock().expect("mutex poisoned").last_hash = Some(hash);
        }
        Ok(accepted)
    }

    pub async fn set_difficulty(&self, text: &str) -> Result<Difficulty, MinerError> {
        let account = self.require_privileged()?;
        if text.trim().is_empty() {
            self.lifecycle.report("Enter new difficulty");
            return Err(MinerError::InvalidInput("Enter new difficulty".into()));
        }
        let difficulty = Difficulty::parse(text)?;

        let sent = async {
            let pending = self.chain.set_difficulty(account, difficulty.value()).await?;
            self.chain.wait_for(pending).await
        }
        .await;
        match sent {
            Ok(receipt) => {
                self.view.lock().expect("mutex poisoned").difficulty = difficulty;
                self.lifecycle.report(format!("Difficulty set to {difficulty}"));
                info!(
                    "ADMIN - difficulty set to {} in block #{}",
                    difficulty, receipt.block_number
                );
                Ok(difficulty)
            }
            Err(e) => {
                self.lifecycle.report("Difficulty update failed");
                warn!("ADMIN - difficulty update failed: {}", e);
                Err(MinerError::AdminUpdateFailed {
                    what: "Difficulty",
                    reason: e.reason(),
                })
            }
        }
    }

    /// Set the per-submission reward, given in ether.
    pub async fn set_reward(&self, eth: &str) -> Result<U256, MinerError> {
        let account = self.require_privileged()?;
        if eth.trim().is_empty() {
            self.lifecycle.report("Enter new reward");
            return Err(MinerError::InvalidInput("Enter new reward".into()));
        }
        let wei = parse_ether(eth)?;

        let sent = async {
            let pending = self.chain.set_reward_amount(account, wei).await?;
            self.chain.wait_for(pending).await
        }
        .await;
        match sent {
            Ok(receipt) => {
                self.view.lock().expect("mutex poisoned").reward = wei;
                self.lifecycle
                    .report(format!("Reward set to {} ETH", format_ether(wei)));
                info!(
                    "ADMIN - reward set to {} wei in block #{}",
                    wei, receipt.block_number
                );
                Ok(wei)
            }
            Err(e) => {
                self.lifecycle.report("Reward update failed");
                warn!("ADMIN - reward update failed: {}", e);
                Err(MinerError::AdminUpdateFailed {
                    what: "Reward",
                    reason: e.reason(),
                })
            }
        }
    }
}

/// Frees the search slot when `auto_find` returns or its future is dropped.
struct SearchGuard<'a> {
    client: &'a MinerClient,
    id: u64,
    finished: bool,
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        let owned = {
            let mut slot = self.client.search.lock().expect("mutex poisoned");
            match slot.take() {
                Some((id, token)) if id == self.id => Some(token),
                other => {
                    *slot = other;
                    None
                }
            }
        };
        // A replaced search leaves the slot and the message to its successor.
        if let Some(token) = owned {
            token.cancel();
            if !self.finished {
                debug!("SEARCH - search {} abandoned", self.id);
                self.client.lifecycle.report("Search cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use primitive_types::H256;

    use super::*;
    use crate::activity::LEADERBOARD_SIZE;
    use crate::chain::EventSource;
    use crate::chain::memory::tests::{owner, valid_nonce};
    use crate::chain::{ChainReader, ChainWriter, MemoryChain};
    use crate::error::Rejection;
    use crate::pow::YIELD_EVERY;
    use crate::session::StaticWallet;
    use crate::submission::{COOLDOWN_SECS, Phase};

    fn chain(difficulty: u64) -> Arc<MemoryChain> {
        Arc::new(MemoryChain::new(
            owner(),
            U256::from(difficulty),
            U256::from(500_000_000_000_000u64),
            U256::exp10(18),
        ))
    }

    fn client_for(chain: &Arc<MemoryChain>, account: Address) -> Arc<MinerClient> {
        Arc::new(MinerClient::new(
            chain.clone(),
            Arc::new(StaticWallet::new(account)),
            0,
        ))
    }

    async fn mine_as(chain: &MemoryChain, miner: Address) -> WorkEvent {
        let nonce = valid_nonce(chain, miner).await;
        let pending = chain.submit_work(miner, nonce).await.unwrap();
        chain.wait_for(pending).await.unwrap();
        let events = chain.query_work_events(0, None).await.unwrap();
        events.last().cloned().unwrap()
    }

    #[tokio::test]
    async fn connect_loads_view_and_history() {
        let chain = chain(1);
        let other = Address::repeat_byte(0x0b);
        let a = mine_as(&chain, other).await;
        let b = mine_as(&chain, other).await;

        let client = client_for(&chain, owner());
        client.connect().await.unwrap();

        let view = client.view();
        assert_eq!(view.account, Some(owner()));
        assert!(view.is_privileged());
        assert_eq!(view.last_hash, Some(b.hash));
        assert_eq!(client.history(), vec![b, a]);
        assert_eq!(client.ranking(LEADERBOARD_SIZE), vec![(other, 2)]);
    }

    #[tokio::test]
    async fn live_events_prepend_and_dedupe() {
        let chain = chain(1);
        let other = Address::repeat_byte(0x0b);
        let client = client_for(&chain, owner());
        let mut feed = client.connect().await.unwrap();

        let event = mine_as(&chain, other).await;
        let delivered = feed.rx.recv().await.unwrap();
        assert_eq!(delivered, event);

        assert!(client.on_live_event(delivered.clone()).await);
        assert!(!client.on_live_event(delivered).await);
        assert_eq!(client.history(), vec![event.clone()]);
        assert_eq!(client.view().last_hash, Some(event.hash));
        assert_eq!(client.view().balance, chain.balance().await.unwrap());
    }

    #[tokio::test]
    async fn pump_processes_feed_in_order() {
        let chain = chain(1);
        let miner = Address::repeat_byte(0x0c);
        let client = client_for(&chain, owner());
        let backfill = mine_as(&chain, miner).await;
        let feed = client.connect().await.unwrap();

        let first = mine_as(&chain, miner).await;
        let second = mine_as(&chain, owner()).await;

        // The feed never closes while the chain is alive; stop once it is drained.
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            client.clone().pump_live_events(feed),
        )
        .await;

        assert_eq!(client.history(), vec![second, first, backfill]);
        assert_eq!(
            client.ranking(LEADERBOARD_SIZE),
            vec![(miner, 2), (owner(), 1)]
        );
    }

    #[tokio::test]
    async fn replaced_feed_stops_without_applying() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        let old = client.connect().await.unwrap();
        let _current = client.subscribe_activity().await.unwrap();
        mine_as(&chain, owner()).await;

        tokio::time::timeout(
            Duration::from_millis(50),
            client.clone().pump_live_events(old),
        )
        .await
        .expect("a replaced feed returns on its next event");
        assert!(client.history().is_empty());
    }

    #[tokio::test]
    async fn history_failure_keeps_previous_state() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();
        let event = mine_as(&chain, owner()).await;
        client.on_live_event(event.clone()).await;

        chain.set_offline(true);
        let err = client.subscribe_activity().await.err().unwrap();
        assert!(matches!(err, MinerError::EventSource(_)));
        assert_eq!(client.history(), vec![event]);
    }

    #[tokio::test]
    async fn auto_find_is_owner_only() {
        let chain = chain(10);
        let client = client_for(&chain, Address::repeat_byte(0x77));
        client.connect().await.unwrap();
        assert_eq!(client.auto_find(None).await, Err(MinerError::NotPrivileged));
    }

    #[tokio::test]
    async fn auto_find_then_submit_is_accepted() {
        let chain = chain(1_000);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();

        let nonce = client.auto_find(Some(U256::zero())).await.unwrap();
        let attempt = client.attempt();
        assert_eq!(attempt.nonce, nonce.to_string());
        assert_eq!(attempt.message, Some(format!("Found nonce {nonce}.")));

        let accepted = client.submit(None).await.unwrap();
        assert_eq!(accepted.nonce, nonce);
        assert_eq!(client.view().last_hash, Some(chain.last_hash().await.unwrap()));
        assert_eq!(client.attempt().cooldown_remaining, COOLDOWN_SECS);
    }

    #[tokio::test]
    async fn auto_find_fetches_unknown_last_hash() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();
        client.view.lock().unwrap().last_hash = None;

        client.auto_find(Some(U256::zero())).await.unwrap();
        assert_eq!(client.view().last_hash, Some(H256::zero()));
    }

    #[tokio::test]
    async fn cancel_without_search_is_a_no_op() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        assert!(!client.cancel_search());
    }

    /// Target 1: no hash is ever below it.
    fn unreachable_chain() -> Arc<MemoryChain> {
        Arc::new(MemoryChain::new(
            owner(),
            U256::MAX,
            U256::from(500_000_000_000_000u64),
            U256::exp10(18),
        ))
    }

    #[tokio::test]
    async fn cancel_stops_running_search() {
        let chain = unreachable_chain();
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();

        let (found, ()) = tokio::join!(client.auto_find(Some(U256::zero())), async {
            while !client.cancel_search() {
                tokio::task::yield_now().await;
            }
        });

        let Err(MinerError::SearchCancelled { resume_from }) = found else {
            panic!("expected a cancelled search, got {found:?}");
        };
        assert!(resume_from > U256::zero());
        assert_eq!(resume_from % U256::from(YIELD_EVERY), U256::zero());
        assert!(client.search.lock().unwrap().is_none());
        assert_eq!(client.attempt().message.as_deref(), Some("Search cancelled"));
        assert!(client.attempt().nonce.is_empty());
    }

    #[tokio::test]
    async fn dropped_search_releases_its_slot() {
        let chain = unreachable_chain();
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();
        {
            let fut = client.auto_find(Some(U256::zero()));
            tokio::pin!(fut);
            // Runs up to the first yield, then is abandoned.
            let polled = tokio::select! {
                biased;
                out = &mut fut => Some(out),
                _ = std::future::ready(()) => None,
            };
            assert!(polled.is_none());
            assert!(client.search.lock().unwrap().is_some());
        }
        assert!(client.search.lock().unwrap().is_none());
        assert!(!client.cancel_search());
        assert_eq!(client.attempt().message.as_deref(), Some("Search cancelled"));
    }

    #[tokio::test]
    async fn submit_without_session_is_blocked() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        let err = client.submit(Some("1".into())).await.unwrap_err();
        assert_eq!(err, MinerError::PreconditionBlocked(BlockReason::NoSession));
        assert_eq!(chain.tx_count(), 0);
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_history_alone() {
        let chain = Arc::new(MemoryChain::new(
            owner(),
            U256::one(),
            U256::from(10u64),
            U256::zero(),
        ));
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();

        let err = client.submit(Some("0".into())).await.unwrap_err();
        assert_eq!(err, MinerError::ValidationRejected(Rejection::InsufficientFunds));
        assert!(client.history().is_empty());
        for _ in 0..COOLDOWN_SECS {
            client.tick();
        }
        assert_eq!(client.attempt().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn admin_updates_change_view_after_finalization() {
        let chain = chain(10);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();

        client.set_difficulty("2000").await.unwrap();
        assert_eq!(client.view().difficulty.value(), U256::from(2_000u64));
        assert_eq!(chain.difficulty().await.unwrap(), U256::from(2_000u64));

        let wei = client.set_reward("0.001").await.unwrap();
        assert_eq!(wei, U256::from(1_000_000_000_000_000u64));
        assert_eq!(client.view().reward, wei);
        assert_eq!(
            client.attempt().message.as_deref(),
            Some("Reward set to 0.001 ETH")
        );
    }

    #[tokio::test]
    async fn admin_rejects_bad_input_and_strangers() {
        let chain = chain(10);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();
        assert!(matches!(
            client.set_difficulty("0").await,
            Err(MinerError::InvalidDifficulty(_))
        ));
        assert!(matches!(
            client.set_difficulty("").await,
            Err(MinerError::InvalidInput(_))
        ));
        assert_eq!(chain.tx_count(), 0);

        let stranger = client_for(&chain, Address::repeat_byte(0x55));
        stranger.connect().await.unwrap();
        assert_eq!(
            stranger.set_reward("1").await,
            Err(MinerError::NotPrivileged)
        );
    }

    #[tokio::test]
    async fn disconnect_clears_session_but_not_history() {
        let chain = chain(1);
        let client = client_for(&chain, owner());
        client.connect().await.unwrap();
        let event = mine_as(&chain, owner()).await;
        client.on_live_event(event).await;
        client.set_nonce_input("42");

        client.disconnect().await;
        let view = client.view();
        assert!(!view.connected());
        assert!(client.attempt().nonce.is_empty());
        assert_eq!(client.history().len(), 1);
    }
}
