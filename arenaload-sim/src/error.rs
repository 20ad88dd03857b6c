use arenaload_store::StoreError;
use thiserror::Error;

/// Why a generated player name or message was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("player name must be 1 to {max} characters, got {len}")]
    PlayerNameLength { len: usize, max: usize },
    #[error("player name contains disallowed character {0:?}")]
    PlayerNameCharacter(char),
    #[error("message is empty")]
    EmptyMessage,
    #[error("message must be at most {max} characters, got {len}")]
    MessageTooLong { len: usize, max: usize },
    #[error("message contains blocked pattern {0:?}")]
    BlockedPattern(&'static str),
}

/// Errors raised by the simulation and its control operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// A store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested lifecycle transition is not allowed right now.
    #[error("{0}")]
    InvalidState(&'static str),

    /// Generated content failed validation. Workers skip the operation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The simulation or dataset configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to encode record")]
    Serde(#[from] serde_json::Error),
}

impl SimError {
    /// Returns `true` if the worker should back off before its next batch.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
