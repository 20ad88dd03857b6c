use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use arenaload_store::{Command, SharedStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::keys;
use crate::stats::LiveStats;

/// Advances the persisted counter once per interval until cancelled.
///
/// The first tick fires immediately and continues from the current value in `live`, so a resumed
/// run writes `C + 1` after a persisted `C`. Write failures are logged and the task keeps ticking.
/// A write that is still pending when the token is cancelled is dropped.
pub(crate) async fn run_counter(
    store: SharedStore,
    live: Arc<LiveStats>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A write still pending at cancellation must not land after `stop` deletes the key.
        let value = live.next_counter();
        let write = store.execute(Command::set(keys::COUNTER, value.to_string()));
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = write => result,
        };

        match result {
            Ok(_) if value % 10 == 0 => tracing::info!(counter = value, "counter advanced"),
            Ok(_) => {}
            Err(err) => tracing::error!(
                counter = value,
                error = &err as &dyn Error,
                "failed to persist counter"
            ),
        }
    }

    tracing::debug!(counter = live.counter_value(), "counter stopped");
}

#[cfg(test)]
mod tests {
    use arenaload_store::{InMemoryStore, Reply, Store};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_interval() {
        let store = InMemoryStore::new();
        let live = Arc::new(LiveStats::default());
        live.set_counter(41);

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_counter(
            Arc::new(store.clone()),
            Arc::clone(&live),
            Duration::from_secs(1),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            store.execute(Command::get(keys::COUNTER)).await.unwrap(),
            Reply::Text("42".into())
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(live.counter_value(), 45);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn survives_write_failures() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let live = Arc::new(LiveStats::default());

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_counter(
            Arc::new(store.clone()),
            Arc::clone(&live),
            Duration::from_secs(1),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        store.set_offline(false);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            store.execute(Command::get(keys::COUNTER)).await.unwrap(),
            Reply::Text("4".into())
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pending_write_is_dropped_on_cancel() {
        let store = InMemoryStore::new();
        store.set_latency(Duration::from_secs(5));
        let live = Arc::new(LiveStats::default());

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_counter(
            Arc::new(store.clone()),
            Arc::clone(&live),
            Duration::from_secs(1),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("counter exits without waiting for the write")
            .unwrap();

        store.set_latency(Duration::ZERO);
        store.execute(Command::del(keys::COUNTER)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!store.contains(keys::COUNTER));
    }
}
