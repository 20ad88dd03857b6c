//! The JSON control surface of the simulation.
//!
//! Control endpoints always answer `200 OK` with a [`ControlResponse`]. Illegal transitions and
//! store failures are reported through `success: false` and a message.

use arenaload_sim::{ControlResponse, Stats};
use axum::extract::State;
use axum::{Json, Router, routing};

use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/stats", routing::get(stats))
        .route("/load-data", routing::post(load_data))
        .route("/start-simulation", routing::post(start_simulation))
        .route("/stop-simulation", routing::post(stop_simulation))
}

async fn stats(State(state): State<ServiceState>) -> Json<Stats> {
    Json(state.simulation.stats().await)
}

async fn load_data(State(state): State<ServiceState>) -> Json<ControlResponse> {
    let result = state.simulation.load().await;
    if let Err(ref err) = result {
        tracing::warn!(error = err as &dyn std::error::Error, "load request failed");
    }
    Json(ControlResponse::from_result(result, "Game data loaded successfully!"))
}

async fn start_simulation(State(state): State<ServiceState>) -> Json<ControlResponse> {
    let result = state.simulation.start().await;
    Json(ControlResponse::from_result(result, "Gaming simulation started!"))
}

async fn stop_simulation(State(state): State<ServiceState>) -> Json<ControlResponse> {
    let result = state.simulation.stop().await;
    Json(ControlResponse::from_result(result, "Simulation stopped"))
}
