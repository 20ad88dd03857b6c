//! Key-value store access for the arena workload.
//!
//! The [`Store`] trait is the only seam the simulation talks through. It speaks a small decoded
//! [`Command`] vocabulary and offers atomic batches via [`Store::pipeline`]. Two backends exist:
//!
//!  - [`RedisStore`] drives a Redis-compatible server through a bounded [`Pool`] of multiplexed
//!    connections.
//!  - [`InMemoryStore`] keeps everything in process and is used by tests.
#![warn(missing_debug_implementations)]

mod backend;
mod command;
mod error;
mod pool;

pub use backend::common::{SharedStore, Store};
pub use backend::in_memory::InMemoryStore;
pub use backend::redis_store::{RedisConfig, RedisStore};
pub use command::{Command, Reply};
pub use error::{StoreError, StoreResult};
pub use pool::{Pool, Pooled};
