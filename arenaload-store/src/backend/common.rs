use std::fmt::Debug;
use std::sync::Arc;

use crate::command::{Command, Reply};
use crate::error::StoreResult;

/// A shared, type-erased [`Store`] instance.
pub type SharedStore = Arc<dyn Store>;

/// A key-value store the workload can talk to.
#[async_trait::async_trait]
pub trait Store: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Executes a single command.
    async fn execute(&self, command: Command) -> StoreResult<Reply>;

    /// Executes all commands as one atomic batch.
    ///
    /// Replies are returned in submission order. If any command fails, the whole call fails with a
    /// single [`StoreError::Batch`](crate::StoreError::Batch).
    async fn pipeline(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>>;
}
