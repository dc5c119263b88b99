use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The contract rejected the call with a revert reason.
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("unknown transaction {0}")]
    UnknownTransaction(Uuid),

    #[error("node unreachable: {0}")]
    Transport(String),

    #[error("malformed value: {0}")]
    Decode(String),
}

impl ChainError {
    /// The most specific reason text available, revert reason first.
    pub fn reason(&self) -> String {
        match self {
            ChainError::Reverted(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
