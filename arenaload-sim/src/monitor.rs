use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use arenaload_store::{Command, SharedStore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::stats::LiveStats;

/// Samples the operation rate once per interval until cancelled.
///
/// Each sample resets the operation accumulator. The store's key count is logged alongside the
/// rate.
pub(crate) async fn run_monitor(
    store: SharedStore,
    live: Arc<LiveStats>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let rate = live.sample();
        match store.execute(Command::DbSize).await.and_then(|r| r.into_int("DBSIZE")) {
            Ok(total_keys) => tracing::info!(ops_per_second = rate, total_keys, "performance"),
            Err(err) => tracing::warn!(
                ops_per_second = rate,
                error = &err as &dyn Error,
                "performance, failed to count keys"
            ),
        }
    }
}
