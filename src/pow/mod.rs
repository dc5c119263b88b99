pub mod hash;
pub mod search;
pub mod target;

pub use hash::{hash_value, work_hash};
pub use search::{SearchOutcome, search, verify};
pub use target::{Difficulty, MAX_HASH, compute_target};

/// Attempts between two cooperative yields of the search loop.
pub const YIELD_EVERY: u64 = 100_000;

/// Upper bound (exclusive) of the random starting nonce.
pub const SEED_RANGE: u64 = 1_000_000;
