//! HTTP and WebSocket surface of the Conclave server

pub mod http;
pub mod notifier;

pub use http::{create_router, AppState};
pub use notifier::RelayNotifier;
