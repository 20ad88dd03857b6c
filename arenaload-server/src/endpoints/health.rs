use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde_json::json;

use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/health", routing::get(health))
}

async fn health(State(state): State<ServiceState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "phase": state.simulation.phase(),
    }))
}
