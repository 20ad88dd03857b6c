//! Synthetic game workload for Redis-compatible stores.
//!
//! A [`Simulation`] loads a baseline dataset shaped like the backend of a multiplayer game, then
//! keeps the store busy with a weighted mix of leaderboard updates, chat messages, session and
//! cache churn, and expiring keys. A counter key advances once per second while the simulation
//! runs. Observers read [`Stats`] snapshots.
//!
//! A restarted process picks up where the previous one stopped via [`Simulation::bootstrap`].
//!
//! Independently, a [`Probe`] drives a fixed-rate read/write load against its own key namespace.
#![warn(missing_debug_implementations)]

pub mod catalog;
pub mod config;
mod counter;
pub mod dataset;
mod error;
pub mod keys;
pub mod message;
mod monitor;
mod orchestrator;
mod probe;
pub mod stats;
pub mod validation;
mod worker;
pub mod workload;

pub use config::{DatasetConfig, SimulationConfig};
pub use dataset::LoadSummary;
pub use error::{SimError, SimResult, ValidationError};
pub use orchestrator::{ControlResponse, Phase, Simulation};
pub use probe::{Probe, ProbeConfig, ProbeMode, ProbeReport};
pub use stats::{LiveStats, Stats};
