use std::fmt;

use primitive_types::U256;
use thiserror::Error;

use crate::chain::ChainError;

/// Why a submission never left the precondition stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    NoSession,
    EmptyNonce,
    InFlight,
    Cooldown(u32),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::NoSession => write!(f, "Connect wallet"),
            BlockReason::EmptyNonce => write!(f, "Enter a nonce"),
            BlockReason::InFlight => write!(f, "A submission is already in progress"),
            BlockReason::Cooldown(secs) => write!(f, "Wait {secs}s before next submit"),
        }
    }
}

/// Classified failure of the trial (non-mutating) evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Stale or incorrect candidate; the user should search again.
    WrongNonce,
    /// The contract cannot pay the reward. Not fixable by the miner.
    InsufficientFunds,
    Other(String),
}

impl Rejection {
    /// Match a revert reason against the messages the contract is known to use.
    pub fn classify(reason: &str) -> Self {
        let lower = reason.to_lowercase();
        if lower.contains("invalid nonce") {
            Rejection::WrongNonce
        } else if lower.contains("insufficient funds") {
            Rejection::InsufficientFunds
        } else {
            Rejection::Other(reason.to_string())
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongNonce => write!(f, "Wrong nonce, try again"),
            Rejection::InsufficientFunds => write!(f, "Contract has no funds for reward"),
            Rejection::Other(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinerError {
    #[error("invalid difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("{0}")]
    PreconditionBlocked(BlockReason),

    #[error("{0}")]
    ValidationRejected(Rejection),

    /// The real transaction failed after the trial passed. Retryable after a
    /// fresh search.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("event source error: {0}")]
    EventSource(String),

    #[error("only the contract owner may do this")]
    NotPrivileged,

    #[error("search cancelled, resume from nonce {resume_from}")]
    SearchCancelled { resume_from: U256 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{what} update failed: {reason}")]
    AdminUpdateFailed { what: &'static str, reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl MinerError {
    /// The status line shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            MinerError::PreconditionBlocked(reason) => reason.to_string(),
            MinerError::ValidationRejected(rejection) => rejection.to_string(),
            MinerError::AdminUpdateFailed { what, .. } => format!("{what} update failed"),
            MinerError::SubmissionFailed(reason) => {
                format!("Submission failed ({reason}), search again and resubmit")
            }
            other => other.to_string(),
        }
    }

    /// Whether the user may simply retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MinerError::SubmissionFailed(_)
                | MinerError::EventSource(_)
                | MinerError::SearchCancelled { .. }
                | MinerError::ValidationRejected(Rejection::WrongNonce)
        )
    }
}
