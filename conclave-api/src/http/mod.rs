// Module: http
// HTTP/JSON signaling API and the WebSocket relay

pub mod error;
pub mod health;
pub mod relay;
pub mod rooms;

use axum::{routing::get, Router};
use conclave_relay::Relay;
use conclave_sfu::SfuManager;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sfu: Arc<SfuManager>,
    pub relay: Arc<Relay>,
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints (liveness)
        .merge(health::create_health_router())
        .merge(rooms::create_room_router())
        .route("/ws", get(relay::relay_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        // Apply state to all routes (must be last)
        .with_state(state)
}
