//! The arenaload server.
//!
//! This wraps an [`arenaload_sim::Simulation`] in a process: layered configuration, logging and
//! error reporting, a JSON control surface, and graceful shutdown that keeps the simulation
//! resumable.

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod observability;
pub mod state;
pub mod web;
