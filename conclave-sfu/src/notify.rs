//! Out-of-band peer notifications
//!
//! Rooms push events to peers through a [`Notifier`]. Delivery is addressed by
//! peer id and is fire-and-forget: implementations must not block, because
//! rooms notify while holding their peer lock to keep per-peer ordering equal
//! to commit ordering.

use crate::types::{ConsumerInfo, MediaKind, PeerId};
use serde::{Deserialize, Serialize};

/// Event pushed to a peer outside of any request it made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerEvent {
    /// A new remote stream is available as a paused consumer
    AddConsumer {
        ship: PeerId,
        kind: MediaKind,
        consumer: ConsumerInfo,
    },
    /// A remote peer left; every consumer of its streams is gone
    RemoveConsumer { ship: PeerId },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, peer: &PeerId, event: PeerEvent);
}

/// Notifier that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _peer: &PeerId, _event: PeerEvent) {}
}
