use log::{debug, info};
use primitive_types::{H160, H256, U256};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::hash::{Preimage, hash_value, work_hash};
use super::{SEED_RANGE, YIELD_EVERY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found {
        nonce: U256,
        hash: H256,
        attempts: u64,
    },
    /// Nothing is kept; restart from `resume_from` to continue where this left off.
    Cancelled { resume_from: U256, attempts: u64 },
}

/// Per-invocation state of the search loop.
pub struct SearchState {
    pub base_hash: H256,
    pub miner: H160,
    pub nonce: U256,
    pub found: bool,
    preimage: Preimage,
}

impl SearchState {
    pub fn new(base_hash: H256, miner: H160, start: U256) -> Self {
        Self {
            base_hash,
            miner,
            nonce: start,
            found: false,
            preimage: Preimage::new(&base_hash, &miner),
        }
    }

    /// Hash the current nonce; marks the state found when it beats `target`.
    fn attempt(&mut self, target: &U256) -> Option<H256> {
        self.preimage.set_nonce(&self.nonce);
        let hash = self.preimage.digest();
        if hash_value(&hash) < *target {
            self.found = true;
            Some(hash)
        } else {
            None
        }
    }

    fn advance(&mut self) {
        self.nonce = self.nonce.overflowing_add(U256::one()).0;
    }
}

/// Random starting point, so concurrent miners rarely walk the same range.
pub fn random_start() -> U256 {
    U256::from(rand::thread_rng().gen_range(0..SEED_RANGE))
}

/// Search for a nonce whose work hash is strictly below `target`.
///
/// Yields to the scheduler every [`YIELD_EVERY`] attempts. Dropping the future
/// or cancelling `cancel` abandons the search at the next yield.
pub async fn search(
    base_hash: H256,
    miner: H160,
    target: U256,
    start_nonce: Option<U256>,
    cancel: &CancellationToken,
) -> SearchOutcome {
    let start = start_nonce.unwrap_or_else(random_start);
    let mut state = SearchState::new(base_hash, miner, start);
    let mut attempts: u64 = 0;

    debug!("SEARCH - start nonce={} target={:#x}", start, target);

    loop {
        attempts += 1;
        if let Some(hash) = state.attempt(&target) {
            info!(
                "SEARCH - found nonce={} after {} attempts (hash={:?})",
                state.nonce, attempts, hash
            );
            return SearchOutcome::Found {
                nonce: state.nonce,
                hash,
                attempts,
            };
        }
        state.advance();

        if attempts % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                info!(
                    "SEARCH - cancelled after {} attempts, resume from {}",
                    attempts, state.nonce
                );
                return SearchOutcome::Cancelled {
                    resume_from: state.nonce,
                    attempts,
                };
            }
        }
    }
}

/// Recompute the work hash for `nonce` and check it against `target`.
pub fn verify(base_hash: &H256, miner: &H160, nonce: &U256, target: &U256) -> bool {
    hash_value(&work_hash(base_hash, miner, nonce)) < *target
}
