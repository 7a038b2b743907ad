//! SFU Room management
//!
//! A room owns one engine transport shared by all of its peers and the peer
//! collection itself. The peer map sits behind a single async mutex: engine
//! calls happen outside of it, and their results are committed under it after
//! re-checking that the state they were computed from still holds.

use crate::engine::EngineClient;
use crate::error::{Result, SfuError};
use crate::fanout::{self, FanoutHandle};
use crate::notify::{Notifier, PeerEvent};
use crate::peer::{ConsumerMap, Peer};
use crate::types::{
    ConsumerId, DtlsParameters, MediaKind, PeerId, ProducerInfo, RoomId, RtpCapabilities,
    RtpParameters, TransportId, TransportInfo,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Result of committing a freshly created consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Recorded for the target peer
    Created,
    /// The target already held a consumer of this exact producer
    Duplicate,
    /// The target left, or the producer was replaced or withdrawn
    Stale,
}

/// A successful publish
#[derive(Debug)]
pub struct Published {
    pub producer: ProducerInfo,
    pub fanout: FanoutHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStats {
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub transport_connected: bool,
    pub peer_count: usize,
    pub producer_count: usize,
    pub consumer_count: usize,
    pub created_at: DateTime<Utc>,
}

pub struct SfuRoom {
    pub id: RoomId,
    transport: TransportInfo,
    /// DTLS parameters the shared transport was connected with
    connected: OnceCell<DtlsParameters>,
    peers: Mutex<HashMap<PeerId, Peer>>,
    engine: EngineClient,
    notifier: Arc<dyn Notifier>,
    created_at: DateTime<Utc>,
}

impl SfuRoom {
    pub fn new(
        id: RoomId,
        transport: TransportInfo,
        engine: EngineClient,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            id,
            transport,
            connected: OnceCell::new(),
            peers: Mutex::new(HashMap::new()),
            engine,
            notifier,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn transport(&self) -> &TransportInfo {
        &self.transport
    }

    pub(crate) const fn engine(&self) -> &EngineClient {
        &self.engine
    }

    /// Reject requests addressed to a transport this room does not own
    pub fn ensure_transport(&self, transport_id: &TransportId) -> Result<()> {
        if *transport_id == self.transport.id {
            Ok(())
        } else {
            Err(SfuError::not_found(format!(
                "transport {transport_id} in room {}",
                self.id
            )))
        }
    }

    /// Connect the shared transport (once) and record the peer's capabilities
    pub async fn connect(
        &self,
        peer_id: &PeerId,
        dtls_parameters: DtlsParameters,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<TransportId> {
        let applied = self
            .connected
            .get_or_try_init(|| async {
                self.engine
                    .connect_transport(&self.transport.id, &dtls_parameters)
                    .await?;
                info!(
                    room_id = %self.id,
                    transport_id = %self.transport.id,
                    peer_id = %peer_id,
                    "Room transport connected"
                );
                Ok::<_, SfuError>(dtls_parameters.clone())
            })
            .await?;

        if *applied != dtls_parameters {
            debug!(
                room_id = %self.id,
                peer_id = %peer_id,
                "Transport already connected, ignoring DTLS parameters"
            );
        }

        self.peers
            .lock()
            .await
            .entry(peer_id.clone())
            .or_insert_with(|| Peer::new(peer_id.clone()))
            .set_rtp_capabilities(rtp_capabilities);

        Ok(self.transport.id.clone())
    }

    /// Publish a stream and start fanning it out to the other peers
    pub async fn produce(
        self: &Arc<Self>,
        peer_id: &PeerId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<Published> {
        let producer = self
            .engine
            .produce(&self.transport.id, kind, rtp_parameters)
            .await?;

        let (replaced, targets) = {
            let mut peers = self.peers.lock().await;
            let replaced = peers
                .entry(peer_id.clone())
                .or_insert_with(|| Peer::new(peer_id.clone()))
                .insert_producer(producer.clone());

            let targets: Vec<(PeerId, RtpCapabilities)> = peers
                .values()
                .filter(|peer| peer.id != *peer_id)
                .filter_map(|peer| {
                    peer.rtp_capabilities()
                        .map(|capabilities| (peer.id.clone(), capabilities.clone()))
                })
                .collect();
            (replaced, targets)
        };

        info!(
            room_id = %self.id,
            peer_id = %peer_id,
            producer_id = %producer.id,
            kind = %kind,
            targets = targets.len(),
            "Producer created"
        );

        let fanout = fanout::spawn(
            Arc::clone(self),
            peer_id.clone(),
            producer.clone(),
            replaced,
            targets,
        );

        Ok(Published { producer, fanout })
    }

    /// Create a consumer of `source`'s producer for `target` and commit it.
    ///
    /// With `announce` set, the target is notified while the peer lock is
    /// still held, so its notifications follow commit order.
    pub(crate) async fn consume_for(
        &self,
        target: &PeerId,
        capabilities: &RtpCapabilities,
        source: &PeerId,
        producer: &ProducerInfo,
        announce: bool,
    ) -> Result<Delivery> {
        let consumer = self
            .engine
            .consume(&self.transport.id, &producer.id, capabilities)
            .await?;

        let (delivery, replaced) = {
            let mut peers = self.peers.lock().await;
            let still_published = peers
                .get(source)
                .and_then(|peer| peer.producer(producer.kind))
                .is_some_and(|current| current.id == producer.id);

            match peers.get_mut(target) {
                None => (Delivery::Stale, None),
                Some(_) if !still_published => (Delivery::Stale, None),
                Some(peer)
                    if peer
                        .consumer(source, producer.kind)
                        .is_some_and(|existing| existing.producer_id == producer.id) =>
                {
                    (Delivery::Duplicate, None)
                }
                Some(peer) => {
                    let replaced = peer.insert_consumer(source.clone(), consumer.clone());
                    if announce {
                        self.notifier.notify(
                            target,
                            PeerEvent::AddConsumer {
                                ship: source.clone(),
                                kind: producer.kind,
                                consumer: consumer.clone(),
                            },
                        );
                    }
                    (Delivery::Created, replaced)
                }
            }
        };

        match delivery {
            Delivery::Created => {
                if let Some(old) = replaced {
                    self.engine.close_consumer(&old.id).await;
                }
                debug!(
                    room_id = %self.id,
                    target = %target,
                    source = %source,
                    consumer_id = %consumer.id,
                    "Consumer created"
                );
            }
            Delivery::Duplicate | Delivery::Stale => {
                self.engine.close_consumer(&consumer.id).await;
            }
        }

        Ok(delivery)
    }

    /// Return the peer's consumers, first creating any it is missing for
    /// streams already published in the room
    pub async fn list_consumers(&self, peer_id: &PeerId) -> Result<ConsumerMap> {
        let (capabilities, missing) = {
            let peers = self.peers.lock().await;
            let peer = peers
                .get(peer_id)
                .ok_or_else(|| self.peer_not_found(peer_id))?;
            let Some(capabilities) = peer.rtp_capabilities().cloned() else {
                return Ok(peer.consumer_map());
            };

            let missing: Vec<(PeerId, ProducerInfo)> = peers
                .values()
                .filter(|other| other.id != *peer_id)
                .flat_map(|other| {
                    other
                        .producers()
                        .filter(move |producer| {
                            peer.consumer(&other.id, producer.kind)
                                .map_or(true, |held| held.producer_id != producer.id)
                        })
                        .map(move |producer| (other.id.clone(), producer.clone()))
                })
                .collect();
            (capabilities, missing)
        };

        if !missing.is_empty() {
            debug!(
                room_id = %self.id,
                peer_id = %peer_id,
                missing = missing.len(),
                "Catching up consumers"
            );
            let results = join_all(missing.iter().map(|(source, producer)| {
                self.consume_for(peer_id, &capabilities, source, producer, false)
            }))
            .await;

            for ((source, producer), result) in missing.iter().zip(results) {
                if let Err(e) = result {
                    warn!(
                        room_id = %self.id,
                        peer_id = %peer_id,
                        source = %source,
                        kind = %producer.kind,
                        error = %e,
                        "Failed to catch up consumer"
                    );
                }
            }
        }

        let peers = self.peers.lock().await;
        peers
            .get(peer_id)
            .map(Peer::consumer_map)
            .ok_or_else(|| self.peer_not_found(peer_id))
    }

    /// Resume the consumer `peer_id` holds for `source`'s `kind` stream
    pub async fn resume_consumer(
        &self,
        peer_id: &PeerId,
        source: &PeerId,
        kind: MediaKind,
    ) -> Result<ConsumerId> {
        let consumer_id = {
            let peers = self.peers.lock().await;
            peers
                .get(peer_id)
                .and_then(|peer| peer.consumer(source, kind))
                .map(|consumer| consumer.id.clone())
                .ok_or_else(|| {
                    SfuError::not_found(format!(
                        "{kind} consumer of {source} for peer {peer_id} in room {}",
                        self.id
                    ))
                })?
        };

        self.engine.resume_consumer(&consumer_id).await?;
        debug!(room_id = %self.id, peer_id = %peer_id, consumer_id = %consumer_id, "Consumer resumed");
        Ok(consumer_id)
    }

    /// Remove a peer, close everything it owned and tell the others.
    ///
    /// Returns `false` when the peer was not in the room.
    pub async fn remove_peer(&self, peer_id: &PeerId) -> bool {
        let (producers, consumers) = {
            let mut peers = self.peers.lock().await;
            let Some(peer) = peers.remove(peer_id) else {
                debug!(room_id = %self.id, peer_id = %peer_id, "Peer already gone");
                return false;
            };

            let (producers, mut consumers) = peer.into_handles();
            for other in peers.values_mut() {
                let orphaned = other.remove_consumers_from(peer_id);
                if !orphaned.is_empty() {
                    self.notifier.notify(
                        &other.id,
                        PeerEvent::RemoveConsumer {
                            ship: peer_id.clone(),
                        },
                    );
                    consumers.extend(orphaned);
                }
            }
            (producers, consumers)
        };

        join_all(consumers.iter().map(|c| self.engine.close_consumer(&c.id))).await;
        join_all(producers.iter().map(|p| self.engine.close_producer(&p.id))).await;

        info!(
            room_id = %self.id,
            peer_id = %peer_id,
            producers = producers.len(),
            consumers = consumers.len(),
            "Peer removed"
        );
        true
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn has_peer(&self, peer_id: &PeerId) -> bool {
        self.peers.lock().await.contains_key(peer_id)
    }

    /// True when no peer is present and nobody is mutating the room
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.peers.try_lock().is_ok_and(|peers| peers.is_empty())
    }

    pub async fn get_stats(&self) -> RoomStats {
        let peers = self.peers.lock().await;
        RoomStats {
            room_id: self.id.clone(),
            transport_id: self.transport.id.clone(),
            transport_connected: self.connected.initialized(),
            peer_count: peers.len(),
            producer_count: peers.values().map(Peer::producer_count).sum(),
            consumer_count: peers.values().map(Peer::consumer_count).sum(),
            created_at: self.created_at,
        }
    }

    /// Release the shared transport
    pub async fn close(&self) {
        self.engine.close_transport(&self.transport.id).await;
        info!(room_id = %self.id, transport_id = %self.transport.id, "Room closed");
    }

    fn peer_not_found(&self, peer_id: &PeerId) -> SfuError {
        SfuError::not_found(format!("peer {peer_id} in room {}", self.id))
    }
}
