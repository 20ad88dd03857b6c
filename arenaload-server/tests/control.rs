//! Blackbox tests for the JSON control surface.
//!
//! The router is driven in process against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arenaload_server::config::{Config, Store};
use arenaload_server::state::{ServiceState, State};
use arenaload_server::web::App;
use arenaload_sim::DatasetConfig;
use arenaload_sim::keys;
use arenaload_store::{Command, InMemoryStore, Reply, Store as _};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

fn test_state(store: &InMemoryStore) -> Result<ServiceState> {
    let mut config = Config {
        store: Store::Memory,
        dataset: DatasetConfig {
            players: 30,
            cache_items: 50,
            lobbies: 5,
            analytics_events: 20,
            ..Default::default()
        },
        ..Default::default()
    };
    config.simulation.workers = 2;
    State::with_store(config, Arc::new(store.clone()))
}

async fn call(state: &ServiceState, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())?;
    let response = App::new(Arc::clone(state)).router().oneshot(request).await?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let state = test_state(&InMemoryStore::new())?;

    let (status, body) = call(&state, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["phase"], "idle");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_data() -> Result<()> {
    let state = test_state(&InMemoryStore::new())?;

    let (status, body) = call(&state, "POST", "/api/start-simulation").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Load data first");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_control_cycle() -> Result<()> {
    let store = InMemoryStore::new();
    let state = test_state(&store)?;

    let (_, body) = call(&state, "GET", "/api/stats").await?;
    assert_eq!(body["data_loaded"], false);
    assert_eq!(body["running"], false);
    assert_eq!(body["profile_stats"]["server_status"], "Ready");

    let (_, body) = call(&state, "POST", "/api/load-data").await?;
    assert_eq!(body["success"], true, "{body}");
    assert_eq!(body["message"], "Game data loaded successfully!");

    let (_, body) = call(&state, "GET", "/api/stats").await?;
    assert_eq!(body["data_loaded"], true);
    assert_eq!(body["profile_stats"]["total_players"], 30);
    assert_eq!(body["leaderboard"].as_array().map(Vec::len), Some(10));

    let (_, body) = call(&state, "POST", "/api/start-simulation").await?;
    assert_eq!(body["success"], true, "{body}");

    // Loading while running is refused.
    let (status, body) = call(&state, "POST", "/api/load-data").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Stop simulation first");

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let (_, body) = call(&state, "GET", "/api/stats").await?;
    assert_eq!(body["running"], true);
    assert!(body["counter_value"].as_u64().unwrap_or_default() >= 2, "{body}");

    let (_, body) = call(&state, "POST", "/api/stop-simulation").await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Simulation stopped");

    let counter = store.execute(Command::get(keys::COUNTER)).await?;
    assert_eq!(counter, Reply::Nil);

    let (_, body) = call(&state, "GET", "/api/stats").await?;
    assert_eq!(body["running"], false);
    assert_eq!(body["counter_value"], 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_succeeds() -> Result<()> {
    let state = test_state(&InMemoryStore::new())?;

    let (_, body) = call(&state, "POST", "/api/stop-simulation").await?;
    assert_eq!(body["success"], true);

    Ok(())
}

#[tokio::test]
async fn test_stats_degrade_when_store_is_down() -> Result<()> {
    let store = InMemoryStore::new();
    let state = test_state(&store)?;
    call(&state, "POST", "/api/load-data").await?;

    store.set_offline(true);
    let (status, body) = call(&state, "GET", "/api/stats").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_stats"]["server_status"], "Error");
    assert_eq!(body["leaderboard"], serde_json::json!([]));

    Ok(())
}

#[tokio::test]
async fn test_unknown_route() -> Result<()> {
    let state = test_state(&InMemoryStore::new())?;

    let request = Request::builder()
        .uri("/api/does-not-exist")
        .body(Body::empty())?;
    let response = App::new(state).router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}
