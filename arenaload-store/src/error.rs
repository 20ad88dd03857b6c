use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable or rejected our credentials.
    ///
    /// Raised during [`connect`](crate::RedisStore::connect) this is terminal. Raised later, by a
    /// connection that dropped mid-run, it is transient.
    #[error("connection error: {context}")]
    Connection {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No pooled connection became available within the acquire timeout.
    #[error("connection pool exhausted after {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// A command did not complete within the command timeout.
    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The store executed the command and returned an error, e.g. `WRONGTYPE`.
    #[error("{command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    /// One or more commands of an atomic batch failed.
    ///
    /// Batches never report partial success, this is the only error the caller sees.
    #[error("batch of {total} commands failed ({failed} errors), first: {first}")]
    Batch {
        total: usize,
        failed: usize,
        first: String,
    },

    /// The reply did not have the shape the command promises.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },
}

impl StoreError {
    pub(crate) fn connection<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns `true` if the caller should back off and retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::PoolExhausted { .. } | Self::Timeout { .. }
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
