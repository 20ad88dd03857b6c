//! Contains all HTTP endpoint handlers.
//!
//! Use [`routes`] to create a router with all endpoints.

use axum::Router;

use crate::state::ServiceState;

mod control;
pub mod health;

pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(health::router())
        .nest("/api", control::router())
}
