//! Delivery of room events over the signaling relay

use conclave_relay::{Relay, SendOutcome};
use conclave_sfu::{Notifier, PeerEvent, PeerId};
use std::sync::Arc;
use tracing::{debug, trace};

/// Pushes [`PeerEvent`]s to the relay connection registered under the
/// peer's id
pub struct RelayNotifier {
    relay: Arc<Relay>,
}

impl RelayNotifier {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }
}

impl Notifier for RelayNotifier {
    fn notify(&self, peer: &PeerId, event: PeerEvent) {
        match self.relay.send_json(peer.as_str(), &event) {
            SendOutcome::Delivered => trace!(peer_id = %peer, "Peer event queued"),
            SendOutcome::NoRecipient => {
                debug!(peer_id = %peer, "Peer has no relay connection, event dropped");
            }
            // The relay already logged why
            SendOutcome::Dropped => {}
        }
    }
}
