//! Health check endpoints
//!
//! Provides simple liveness checks, plus a statistics
//! snapshot.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::http::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health-check", get(health_check_legacy))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

async fn root() -> impl IntoResponse {
    "hello world"
}

async fn health_check_legacy() -> impl IntoResponse {
    "all good bro"
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub rooms: usize,
    pub peers: usize,
    pub producers: usize,
    pub consumers: usize,
    pub relay_connections: usize,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let sfu = state.sfu.get_stats().await;
    Json(StatsResponse {
        rooms: sfu.active_rooms,
        peers: sfu.total_peers,
        producers: sfu.total_producers,
        consumers: sfu.total_consumers,
        relay_connections: state.relay.connection_count(),
    })
}
