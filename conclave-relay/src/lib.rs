//! Conclave signaling relay
//!
//! A minimal peer-addressed message relay. Clients open a long-lived
//! connection, register under a self-declared peer id, and forward opaque
//! JSON to other registered peers. The server uses the same registry to push
//! its own events to peers.
//!
//! Peer ids are not authenticated: whoever registers last owns the id.

mod config;
mod error;
mod message;
mod relay;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use message::InboundMessage;
pub use relay::{ConnectionId, Relay, RelayConnection, SendOutcome};
