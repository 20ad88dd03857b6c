use std::sync::Arc;

use anyhow::{Context, Result};
use arenaload_sim::Simulation;
use arenaload_store::{InMemoryStore, RedisStore, SharedStore};

use crate::config::{Config, Store};

/// Shared reference to the arenaload [service state](State).
pub type ServiceState = Arc<State>;

/// Shared state of the server.
///
/// Created during startup and shared with all HTTP request handlers. In request handlers, use
/// `axum::extract::State<ServiceState>` to retrieve a shared reference to this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// The simulation driven by the control endpoints.
    pub simulation: Simulation,
}

impl State {
    /// Connects to the store and creates an idle simulation.
    ///
    /// Fails if the store is unreachable, which terminates the process.
    pub async fn new(config: Config) -> Result<ServiceState> {
        let store = connect(&config.store).await?;
        Self::with_store(config, store)
    }

    /// Creates the state on top of an existing store.
    pub fn with_store(config: Config, store: SharedStore) -> Result<ServiceState> {
        let simulation = Simulation::new(
            store,
            config.simulation.clone(),
            config.dataset.clone(),
        )?;
        Ok(Arc::new(Self { config, simulation }))
    }
}

/// Opens the configured store backend.
pub async fn connect(config: &Store) -> Result<SharedStore> {
    let Some(redis) = config.redis_config() else {
        tracing::warn!("using the in-memory store, data is lost on exit");
        return Ok(Arc::new(InMemoryStore::new()));
    };

    let store = RedisStore::connect(&redis)
        .await
        .with_context(|| format!("failed to connect to {}:{}", redis.host, redis.port))?;
    Ok(Arc::new(store))
}
