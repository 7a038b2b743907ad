//! Peer-addressed relay registry
//!
//! Each live client connection owns an outbound FIFO channel. Registering
//! under a peer id points that id at the connection's channel, replacing
//! whatever it pointed at before. Sends never block: a full channel drops
//! the message.

use crate::config::RelayConfig;
use crate::error::Result;
use crate::message::InboundMessage;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Identifier of one physical connection, never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened to a message handed to [`Relay::send_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Nobody is registered under the target id
    NoRecipient,
    /// The recipient's outbound buffer is full or its writer is gone
    Dropped,
}

struct Registration {
    connection: ConnectionId,
    tx: mpsc::Sender<String>,
}

pub struct Relay {
    config: RelayConfig,
    registrations: DashMap<String, Registration>,
}

impl Relay {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registrations: DashMap::new(),
        }
    }

    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open a connection. The receiver yields every message addressed to it,
    /// in order; the caller writes them to the client.
    pub fn connect(self: &Arc<Self>) -> (RelayConnection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer.max(1));
        let connection = RelayConnection {
            id: ConnectionId::generate(),
            relay: Arc::clone(self),
            tx,
            registered: None,
        };
        debug!(connection_id = %connection.id, "Relay connection opened");
        (connection, rx)
    }

    /// Queue `payload` for the connection registered as `target`
    pub fn send_to(&self, target: &str, payload: String) -> SendOutcome {
        let Some(tx) = self
            .registrations
            .get(target)
            .map(|registration| registration.tx.clone())
        else {
            debug!(target, "No relay connection registered, dropping message");
            return SendOutcome::NoRecipient;
        };

        match tx.try_send(payload) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                warn!(target, "Relay connection too slow to consume messages, dropping message");
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                debug!(target, "Relay connection closed, dropping message");
                SendOutcome::Dropped
            }
        }
    }

    /// Serialize `message` and queue it for `target`
    pub fn send_json<T: Serialize>(&self, target: &str, message: &T) -> SendOutcome {
        match serde_json::to_string(message) {
            Ok(payload) => self.send_to(target, payload),
            Err(e) => {
                warn!(target, error = %e, "Failed to serialize relay message");
                SendOutcome::Dropped
            }
        }
    }

    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.registrations.contains_key(id)
    }

    /// Number of registered peer ids
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registrations.len()
    }

    fn unregister(&self, id: &str, connection: &ConnectionId) -> bool {
        self.registrations
            .remove_if(id, |_, registration| registration.connection == *connection)
            .is_some()
    }
}

/// One client connection. Dropping it releases its registration, unless a
/// newer connection has claimed the id since.
pub struct RelayConnection {
    id: ConnectionId,
    relay: Arc<Relay>,
    tx: mpsc::Sender<String>,
    registered: Option<String>,
}

impl RelayConnection {
    #[must_use]
    pub const fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Peer id this connection is currently registered as
    #[must_use]
    pub fn registered_as(&self) -> Option<&str> {
        self.registered.as_deref()
    }

    /// Handle one inbound text frame
    pub fn handle_text(&mut self, text: &str) -> Result<()> {
        match InboundMessage::parse(text)? {
            InboundMessage::Register { id } => self.register(id),
            InboundMessage::Forward { target, content } => {
                self.relay.send_to(&target, content);
            }
        }
        Ok(())
    }

    /// Bind this connection to `peer_id`, replacing any earlier binding of
    /// that id
    pub fn register(&mut self, peer_id: String) {
        if let Some(previous) = self.registered.take() {
            if previous != peer_id {
                self.relay.unregister(&previous, &self.id);
            }
        }

        let replaced = self.relay.registrations.insert(
            peer_id.clone(),
            Registration {
                connection: self.id.clone(),
                tx: self.tx.clone(),
            },
        );
        if replaced.is_some_and(|old| old.connection != self.id) {
            info!(peer_id = %peer_id, connection_id = %self.id, "Relay registration replaced");
        } else {
            debug!(peer_id = %peer_id, connection_id = %self.id, "Relay connection registered");
        }
        self.registered = Some(peer_id);
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(peer_id) = self.registered.take() {
            if self.relay.unregister(&peer_id, &self.id) {
                debug!(peer_id = %peer_id, connection_id = %self.id, "Relay registration released");
            } else {
                debug!(
                    peer_id = %peer_id,
                    connection_id = %self.id,
                    "Relay registration already taken over"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;

    fn relay() -> Arc<Relay> {
        Arc::new(Relay::new(RelayConfig::default()))
    }

    #[tokio::test]
    async fn test_register_and_forward() {
        let relay = relay();
        let (mut alice, _alice_rx) = relay.connect();
        let (mut bob, mut bob_rx) = relay.connect();

        bob.handle_text(r#"{"id":"bob"}"#).unwrap();
        alice.handle_text(r#"{"id":"alice"}"#).unwrap();
        alice
            .handle_text(r#"{"target":"bob","content":{"sdp":"v=0","b":2,"a":1}}"#)
            .unwrap();

        assert_eq!(bob_rx.recv().await.unwrap(), r#"{"sdp":"v=0","b":2,"a":1}"#);
        assert_eq!(relay.connection_count(), 2);
        assert_eq!(bob.registered_as(), Some("bob"));
    }

    #[tokio::test]
    async fn test_forward_to_unknown_target_is_silent() {
        let relay = relay();
        let (mut alice, mut alice_rx) = relay.connect();
        alice.handle_text(r#"{"id":"alice"}"#).unwrap();

        alice
            .handle_text(r#"{"target":"nobody","content":"hi"}"#)
            .unwrap();

        assert_eq!(relay.send_to("nobody", "x".to_string()), SendOutcome::NoRecipient);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reregistration_and_stale_close() {
        let relay = relay();
        let (mut first, mut first_rx) = relay.connect();
        let (mut second, mut second_rx) = relay.connect();

        first.register("p1".to_string());
        second.register("p1".to_string());
        assert_eq!(relay.send_to("p1", "one".to_string()), SendOutcome::Delivered);
        assert_eq!(second_rx.recv().await.unwrap(), "one");
        assert!(first_rx.try_recv().is_err());

        // The superseded connection closing must not unregister the new one
        drop(first);
        assert!(relay.is_registered("p1"));
        assert_eq!(relay.send_to("p1", "two".to_string()), SendOutcome::Delivered);
        assert_eq!(second_rx.recv().await.unwrap(), "two");

        drop(second);
        assert!(!relay.is_registered("p1"));
        assert_eq!(relay.send_to("p1", "three".to_string()), SendOutcome::NoRecipient);
    }

    #[tokio::test]
    async fn test_connection_renaming_releases_old_id() {
        let relay = relay();
        let (mut conn, _rx) = relay.connect();

        conn.register("old".to_string());
        conn.register("new".to_string());

        assert!(!relay.is_registered("old"));
        assert!(relay.is_registered("new"));
        assert_eq!(relay.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frames_leave_connection_usable() {
        let relay = relay();
        let (mut conn, mut rx) = relay.connect();

        assert!(matches!(conn.handle_text("{oops"), Err(RelayError::Malformed(_))));
        assert!(matches!(conn.handle_text("{}"), Err(RelayError::UnrecognizedFrame)));
        assert!(conn.registered_as().is_none());

        conn.handle_text(r#"{"id":"p1"}"#).unwrap();
        relay.send_json("p1", &serde_json::json!({ "ok": true }));
        assert_eq!(rx.recv().await.unwrap(), r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_messages() {
        let relay = Arc::new(Relay::new(RelayConfig {
            outbound_buffer: 2,
            ..RelayConfig::default()
        }));
        let (mut slow, mut rx) = relay.connect();
        slow.register("slow".to_string());

        assert_eq!(relay.send_to("slow", "1".to_string()), SendOutcome::Delivered);
        assert_eq!(relay.send_to("slow", "2".to_string()), SendOutcome::Delivered);
        assert_eq!(relay.send_to("slow", "3".to_string()), SendOutcome::Dropped);

        assert_eq!(rx.recv().await.unwrap(), "1");
        assert_eq!(rx.recv().await.unwrap(), "2");
        assert_eq!(relay.send_to("slow", "4".to_string()), SendOutcome::Delivered);
        assert_eq!(rx.recv().await.unwrap(), "4");
    }

    #[tokio::test]
    async fn test_closed_receiver_drops_messages() {
        let relay = relay();
        let (mut conn, rx) = relay.connect();
        conn.register("p1".to_string());
        drop(rx);

        assert_eq!(relay.send_to("p1", "lost".to_string()), SendOutcome::Dropped);
    }
}
