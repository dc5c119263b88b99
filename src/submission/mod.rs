pub mod lifecycle;

pub use lifecycle::{Accepted, Phase, SubmissionAttempt, SubmissionLifecycle};

/// Seconds a miner must wait after any submission outcome.
pub const COOLDOWN_SECS: u32 = 30;

/// Seconds a submission result stays on screen.
pub const MESSAGE_TTL_SECS: u32 = 5;
