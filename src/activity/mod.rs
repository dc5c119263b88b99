pub mod aggregator;

use std::collections::HashSet;

use primitive_types::{H256, U256};

pub use aggregator::{ActivityAggregator, Leaderboard, load_historical};

use crate::chain::{Address, WorkEvent};

/// Number of miners shown on the leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// Identity of a `WorkSubmitted` event for redelivery checks.
pub type EventKey = (Address, U256, H256);

/// Keys of every event already handed to the aggregator.
///
/// The aggregator itself trusts its feed; whoever feeds it after a
/// reconnect filters redeliveries through this first.
#[derive(Debug, Default)]
pub struct SeenEvents {
    keys: HashSet<EventKey>,
}

impl SeenEvents {
    pub fn key(event: &WorkEvent) -> EventKey {
        (event.miner, event.nonce, event.hash)
    }

    /// Returns `false` if the event was already seen.
    pub fn insert(&mut self, event: &WorkEvent) -> bool {
        self.keys.insert(Self::key(event))
    }

    pub fn reset<'a>(&mut self, events: impl IntoIterator<Item = &'a WorkEvent>) {
        self.keys = events.into_iter().map(Self::key).collect();
    }
}
