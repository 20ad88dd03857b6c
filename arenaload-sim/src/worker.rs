use std::error::Error;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::SimError;
use crate::stats::LiveStats;
use crate::workload::Workload;

/// Runs batches of operations until the token is cancelled.
///
/// Cancellation is observed between batches, so at most one batch is in flight when the worker
/// exits. Failed operations are logged and counted. A connectivity failure aborts the current batch
/// and backs off before the next one.
pub(crate) async fn run_worker(
    id: usize,
    mut workload: Workload,
    live: Arc<LiveStats>,
    error_backoff: std::time::Duration,
    token: CancellationToken,
) {
    tracing::debug!(worker = id, "worker started");

    while !token.is_cancelled() {
        let mut backoff = false;

        for _ in 0..workload.batch_size() {
            let operation = workload.next_operation();
            match workload.execute(operation).await {
                Ok(()) => live.record_success(),
                Err(SimError::Validation(err)) => {
                    live.record_skip();
                    tracing::debug!(
                        worker = id,
                        operation = operation.name(),
                        reason = %err,
                        "skipped operation"
                    );
                }
                Err(err) => {
                    live.record_failure();
                    tracing::error!(
                        worker = id,
                        operation = operation.name(),
                        error = &err as &dyn Error,
                        "operation failed"
                    );
                    if err.is_transient() {
                        backoff = true;
                        break;
                    }
                }
            }
        }

        let pause = if backoff {
            error_backoff
        } else {
            workload.pause()
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    tracing::debug!(worker = id, "worker stopped");
}
