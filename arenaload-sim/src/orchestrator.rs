//! Lifecycle of a simulation run.
//!
//! [`Simulation`] is a state machine over [`Phase`]:
//!
//!  - `Idle --load()--> Loaded`
//!  - `Loaded --start()--> Running`, spawning the workers, the counter and the monitor
//!  - `Running --stop()--> Loaded`, joining every task and deleting the persisted counter
//!
//! [`Simulation::bootstrap`] runs once when the process starts and picks up a previous run from the
//! store: a non-empty leaderboard means `Loaded`, and a persisted counter above zero means the run
//! is resumed from that counter value.
//!
//! Lifecycle calls are serialized, so a `stop` followed by a `start` never leaves two worker sets
//! behind.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use arenaload_store::{Command, SharedStore};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::config::{DatasetConfig, SimulationConfig};
use crate::counter::run_counter;
use crate::dataset::{self, LoadSummary};
use crate::error::{SimError, SimResult};
use crate::keys;
use crate::monitor::run_monitor;
use crate::stats::{self, LiveStats, Stats};
use crate::worker::run_worker;
use crate::workload::Workload;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No dataset has been loaded.
    Idle,
    /// A dataset is present and no tasks run.
    Loaded,
    /// Workers, counter and monitor are running.
    Running,
}

/// The outcome of a control operation, as reported to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn from_result<T>(result: SimResult<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(_) => Self::ok(message),
            Err(err) => Self {
                success: false,
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Worker(usize),
    Counter,
    Monitor,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker(id) => write!(f, "worker-{id}"),
            Self::Counter => write!(f, "counter"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

#[derive(Debug, Default)]
struct Tasks {
    token: Option<CancellationToken>,
    handles: Vec<(TaskKind, JoinHandle<()>)>,
}

#[derive(Debug)]
struct Inner {
    store: SharedStore,
    config: Arc<SimulationConfig>,
    dataset: DatasetConfig,
    roster: Arc<[String]>,
    live: Arc<LiveStats>,
    phase: watch::Sender<Phase>,
    /// Held for the whole duration of a lifecycle call.
    tasks: Mutex<Tasks>,
}

/// Owns the shared state of a simulation and drives its lifecycle.
///
/// Cloning is cheap and yields a handle to the same simulation.
#[derive(Clone, Debug)]
pub struct Simulation(Arc<Inner>);

impl Simulation {
    /// Creates an idle simulation after validating both configurations.
    pub fn new(
        store: SharedStore,
        config: SimulationConfig,
        dataset: DatasetConfig,
    ) -> SimResult<Self> {
        config.validate()?;
        dataset.validate()?;

        let roster = catalog::roster(dataset.players).into();
        let (phase, _) = watch::channel(Phase::Idle);

        Ok(Self(Arc::new(Inner {
            store,
            config: Arc::new(config),
            dataset,
            roster,
            live: Arc::new(LiveStats::default()),
            phase,
            tasks: Mutex::new(Tasks::default()),
        })))
    }

    pub fn phase(&self) -> Phase {
        *self.0.phase.borrow()
    }

    /// Subscribes to phase transitions.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.0.phase.subscribe()
    }

    pub fn live(&self) -> &LiveStats {
        &self.0.live
    }

    pub fn store(&self) -> &SharedStore {
        &self.0.store
    }

    /// Number of worker tasks of the current run.
    pub async fn worker_count(&self) -> usize {
        let tasks = self.0.tasks.lock().await;
        tasks
            .handles
            .iter()
            .filter(|(kind, _)| matches!(kind, TaskKind::Worker(_)))
            .count()
    }

    /// Detects a previous run in the store and continues it.
    ///
    /// Detection failures are logged and leave the simulation idle.
    pub async fn bootstrap(&self) -> Phase {
        if !self.0.config.auto_resume {
            tracing::info!("auto-resume disabled, waiting for manual initialization");
            return self.phase();
        }

        match self.detect().await {
            Ok(None) => {
                tracing::info!("no existing data found, waiting for manual initialization");
            }
            Ok(Some((players, counter))) => {
                tracing::info!(players, counter, "found existing dataset");
                self.0.live.set_counter(counter);
                self.0.phase.send_replace(Phase::Loaded);

                if counter > 0 {
                    tracing::info!(counter, "resuming simulation");
                    if let Err(err) = self.start().await {
                        tracing::error!(error = &err as &dyn Error, "failed to resume simulation");
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn Error,
                    "failed to detect existing data, waiting for manual initialization"
                );
            }
        }

        self.phase()
    }

    /// Returns the leaderboard size and persisted counter if a dataset exists.
    async fn detect(&self) -> SimResult<Option<(i64, u64)>> {
        let store = &self.0.store;
        let players = store
            .execute(Command::SortedSetCard {
                key: keys::LEADERBOARD.into(),
            })
            .await?
            .into_int("ZCARD")?;
        if players == 0 {
            return Ok(None);
        }

        let counter = match store
            .execute(Command::get(keys::COUNTER))
            .await?
            .into_text("GET")?
        {
            Some(text) => text.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %text, "ignoring malformed counter");
                0
            }),
            None => 0,
        };

        Ok(Some((players, counter)))
    }

    /// Replaces the baseline dataset. Fails while running.
    pub async fn load(&self) -> SimResult<LoadSummary> {
        let _tasks = self.0.tasks.lock().await;
        if self.phase() == Phase::Running {
            tracing::warn!("refusing to load data while the simulation is running");
            return Err(SimError::InvalidState("Stop simulation first"));
        }

        let mut rng = SmallRng::seed_from_u64(rand::random());
        let summary = dataset::load(
            self.0.store.as_ref(),
            &self.0.dataset,
            &self.0.roster,
            &mut rng,
        )
        .await?;

        self.0.phase.send_replace(Phase::Loaded);
        Ok(summary)
    }

    /// Spawns the worker pool, the counter and the monitor.
    pub async fn start(&self) -> SimResult<()> {
        let mut tasks = self.0.tasks.lock().await;
        match self.phase() {
            Phase::Idle => return Err(SimError::InvalidState("Load data first")),
            Phase::Running => return Err(SimError::InvalidState("Simulation already running")),
            Phase::Loaded => {}
        }

        // Build every workload before spawning anything.
        let workloads = (0..self.0.config.workers)
            .map(|_| {
                Workload::builder(
                    Arc::clone(&self.0.store),
                    Arc::clone(&self.0.config),
                    Arc::clone(&self.0.roster),
                )
                .build()
            })
            .collect::<SimResult<Vec<_>>>()?;

        let token = CancellationToken::new();
        let live = &self.0.live;
        let config = &self.0.config;
        live.reset_run();

        for (id, workload) in workloads.into_iter().enumerate() {
            let handle = tokio::spawn(run_worker(
                id,
                workload,
                Arc::clone(live),
                config.error_backoff,
                token.child_token(),
            ));
            tasks.handles.push((TaskKind::Worker(id), handle));
        }

        let counter = tokio::spawn(run_counter(
            Arc::clone(&self.0.store),
            Arc::clone(live),
            config.counter_interval,
            token.child_token(),
        ));
        tasks.handles.push((TaskKind::Counter, counter));

        let monitor = tokio::spawn(run_monitor(
            Arc::clone(&self.0.store),
            Arc::clone(live),
            config.monitor_interval,
            token.child_token(),
        ));
        tasks.handles.push((TaskKind::Monitor, monitor));

        tasks.token = Some(token);
        self.0.phase.send_replace(Phase::Running);

        tracing::info!(
            workers = config.workers,
            counter = live.counter_value(),
            "simulation started"
        );
        Ok(())
    }

    /// Stops all tasks and deletes the persisted counter.
    ///
    /// Succeeds when nothing is running. A failure to delete the counter is logged.
    pub async fn stop(&self) -> SimResult<()> {
        let mut tasks = self.0.tasks.lock().await;
        self.halt(&mut tasks).await;
        self.0.live.set_counter(0);

        match self.0.store.execute(Command::del(keys::COUNTER)).await {
            Ok(_) => tracing::info!("counter removed"),
            Err(err) => {
                tracing::error!(error = &err as &dyn Error, "failed to remove counter")
            }
        }

        Ok(())
    }

    /// Stops all tasks and keeps the persisted counter, so the next process resumes the run.
    pub async fn shutdown(&self) {
        let mut tasks = self.0.tasks.lock().await;
        self.halt(&mut tasks).await;
    }

    /// Cancels and joins every task, abandoning those that miss the stop timeout.
    async fn halt(&self, tasks: &mut Tasks) {
        let Some(token) = tasks.token.take() else {
            return;
        };

        tracing::info!("stopping simulation");
        token.cancel();

        // Every task gets the full timeout, joined concurrently.
        let timeout = self.0.config.stop_timeout;
        let joins = tasks.handles.drain(..).map(|(kind, mut handle)| async move {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(task = %kind, error = &err as &dyn Error, "task failed")
                }
                // Aborting drops the write the task is blocked on.
                Err(_) => {
                    handle.abort();
                    tracing::warn!(task = %kind, ?timeout, "task did not stop in time, abandoning")
                }
            }
        });
        futures::future::join_all(joins).await;

        self.0.live.reset_run();
        if self.phase() == Phase::Running {
            self.0.phase.send_replace(Phase::Loaded);
        }
        tracing::info!("simulation stopped");
    }

    /// Returns a statistics snapshot. Never fails.
    pub async fn stats(&self) -> Stats {
        stats::collect(self.0.store.as_ref(), &self.0.live, self.phase()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arenaload_store::{InMemoryStore, Reply, Store};

    use super::*;
    use crate::config::Band;

    fn dataset() -> DatasetConfig {
        DatasetConfig {
            players: 20,
            cache_items: 10,
            lobbies: 2,
            rate_limited_players: 2,
            achievement_players: 2,
            achievements_per_player: Band::new(1, 2),
            analytics_events: 5,
            notification_players: 2,
            notifications_per_player: Band::new(1, 1),
            ..Default::default()
        }
    }

    fn simulation(store: &InMemoryStore, workers: usize) -> Simulation {
        let config = SimulationConfig {
            workers,
            ..Default::default()
        };
        Simulation::new(Arc::new(store.clone()), config, dataset()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_data() {
        let store = InMemoryStore::new();
        let sim = simulation(&store, 2);

        let err = sim.start().await.unwrap_err();
        assert!(matches!(err, SimError::InvalidState("Load data first")));
        assert_eq!(sim.worker_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_while_running_writes_nothing() {
        let store = InMemoryStore::new();
        let sim = simulation(&store, 2);
        sim.load().await.unwrap();
        sim.start().await.unwrap();

        // Notification keys carry fresh ids on every load and are never touched by workers.
        let before = store.keys_with_prefix("notification:");
        assert!(!before.is_empty());

        let err = sim.load().await.unwrap_err();
        assert!(matches!(err, SimError::InvalidState(_)));
        assert_eq!(
            ControlResponse::from_result(Err::<(), _>(err), "loaded"),
            ControlResponse {
                success: false,
                message: "Stop simulation first".into()
            }
        );
        assert_eq!(store.keys_with_prefix("notification:"), before);

        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_double_spawn() {
        let store = InMemoryStore::new();
        let sim = simulation(&store, 3);
        sim.load().await.unwrap();

        sim.start().await.unwrap();
        assert_eq!(sim.worker_count().await, 3);
        assert!(matches!(
            sim.start().await,
            Err(SimError::InvalidState("Simulation already running"))
        ));
        assert_eq!(sim.worker_count().await, 3);

        sim.stop().await.unwrap();
        assert_eq!(sim.worker_count().await, 0);
        sim.start().await.unwrap();
        assert_eq!(sim.worker_count().await, 3);

        sim.stop().await.unwrap();
        assert_eq!(sim.phase(), Phase::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_resumes_from_persisted_counter() {
        let store = InMemoryStore::new();
        simulation(&store, 1).load().await.unwrap();
        store
            .execute(Command::set(keys::COUNTER, "7"))
            .await
            .unwrap();

        let sim = simulation(&store, 1);
        assert_eq!(sim.bootstrap().await, Phase::Running);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            store.execute(Command::get(keys::COUNTER)).await.unwrap(),
            Reply::Text("8".into())
        );

        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_without_counter_stays_loaded() {
        let store = InMemoryStore::new();
        simulation(&store, 1).load().await.unwrap();

        let sim = simulation(&store, 1);
        assert_eq!(sim.bootstrap().await, Phase::Loaded);
        assert_eq!(sim.worker_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_on_empty_store_stays_idle() {
        let store = InMemoryStore::new();
        store.execute(Command::set(keys::COUNTER, "7")).await.unwrap();

        let sim = simulation(&store, 1);
        assert_eq!(sim.bootstrap().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_failure_stays_idle() {
        let store = InMemoryStore::new();
        store.set_offline(true);

        let sim = simulation(&store, 1);
        assert_eq!(sim.bootstrap().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_the_counter() {
        let store = InMemoryStore::new();
        let sim = simulation(&store, 1);
        sim.load().await.unwrap();
        sim.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        sim.shutdown().await;

        assert_eq!(sim.phase(), Phase::Loaded);
        assert_eq!(sim.worker_count().await, 0);
        assert_eq!(
            store.execute(Command::get(keys::COUNTER)).await.unwrap(),
            Reply::Text("3".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_a_no_op() {
        let store = InMemoryStore::new();
        let sim = simulation(&store, 1);

        sim.stop().await.unwrap();
        assert_eq!(sim.phase(), Phase::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            workers: 0,
            ..Default::default()
        };
        let result = Simulation::new(
            Arc::new(InMemoryStore::new()),
            config,
            DatasetConfig::default(),
        );
        assert!(matches!(result, Err(SimError::Config(_))));
    }
}
