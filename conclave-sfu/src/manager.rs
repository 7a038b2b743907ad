//! SFU Manager - Top-level orchestration for multi-room SFU management
//!
//! This module provides:
//! - Lazy room creation with exactly one engine transport per room
//! - Request routing to the room owning a transport or peer
//! - Optional background reclamation of empty rooms
//! - Global statistics collection

use crate::config::SfuConfig;
use crate::engine::{EngineClient, MediaEngine};
use crate::error::{Result, SfuError};
use crate::notify::Notifier;
use crate::peer::ConsumerMap;
use crate::room::{Published, SfuRoom};
use crate::types::{
    ConsumerId, DtlsParameters, MediaKind, PeerId, RoomId, RtpCapabilities, RtpParameters,
    TransportId,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Global SFU manager statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Number of active rooms
    pub active_rooms: usize,
    /// Total number of peers across all rooms
    pub total_peers: usize,
    /// Total number of producers across all rooms
    pub total_producers: usize,
    /// Total number of consumers across all rooms
    pub total_consumers: usize,
}

type RoomCell = Arc<OnceCell<Arc<SfuRoom>>>;

fn require_non_empty(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(SfuError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

/// SFU Manager - owns every room and routes requests to them
pub struct SfuManager {
    config: Arc<SfuConfig>,

    /// Rooms by id. A cell is inserted before its transport exists so that
    /// concurrent first references to one id share a single creation.
    rooms: DashMap<RoomId, RoomCell>,

    engine: EngineClient,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
}

impl SfuManager {
    /// Create a new SFU manager, starting the empty room sweeper if configured
    pub fn new(
        config: SfuConfig,
        engine: Arc<dyn MediaEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            engine: EngineClient::new(engine, config.engine_timeout()),
            config: Arc::new(config),
            rooms: DashMap::new(),
            notifier,
            shutdown: CancellationToken::new(),
        });

        info!(
            listen_ips = manager.config.listen_ips.len(),
            engine_timeout_ms = manager.config.engine_timeout_ms,
            empty_room_sweep_secs = manager.config.empty_room_sweep_secs,
            "SFU Manager initialized"
        );

        if let Some(period) = manager.config.sweep_interval() {
            tokio::spawn(Self::sweep_task(
                Arc::downgrade(&manager),
                period,
                manager.shutdown.clone(),
            ));
        }

        manager
    }

    /// Router capabilities clients negotiate against
    #[must_use]
    pub fn capabilities(&self) -> RtpCapabilities {
        self.engine.rtp_capabilities()
    }

    /// Get or create a room
    pub async fn get_or_create_room(&self, room_id: &RoomId) -> Result<Arc<SfuRoom>> {
        require_non_empty("room id", room_id.as_str())?;
        let cell = Arc::clone(self.rooms.entry(room_id.clone()).or_default().value());

        let created = cell
            .get_or_try_init(|| async {
                let transport = self
                    .engine
                    .create_transport(&self.config.transport_options())
                    .await?;
                info!(
                    room_id = %room_id,
                    transport_id = %transport.id,
                    "Created new room"
                );
                Ok::<_, SfuError>(Arc::new(SfuRoom::new(
                    room_id.clone(),
                    transport,
                    self.engine.clone(),
                    Arc::clone(&self.notifier),
                )))
            })
            .await;

        match created {
            Ok(room) => Ok(Arc::clone(room)),
            Err(e) => {
                // Forget the empty cell unless another caller is still waiting on it
                self.rooms.remove_if(room_id, |_, current| {
                    Arc::ptr_eq(current, &cell)
                        && current.get().is_none()
                        && Arc::strong_count(current) == 2
                });
                Err(e)
            }
        }
    }

    /// Look up an existing room
    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<SfuRoom>> {
        self.rooms
            .get(room_id)
            .and_then(|cell| cell.get().cloned())
    }

    fn require_room(&self, room_id: &RoomId) -> Result<Arc<SfuRoom>> {
        self.room(room_id)
            .ok_or_else(|| SfuError::not_found(format!("room {room_id}")))
    }

    /// Connect a peer to the room transport and record its capabilities
    pub async fn connect(
        &self,
        room_id: &RoomId,
        transport_id: &TransportId,
        peer_id: &PeerId,
        dtls_parameters: DtlsParameters,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<TransportId> {
        require_non_empty("peer id", peer_id.as_str())?;
        let room = self.require_room(room_id)?;
        room.ensure_transport(transport_id)?;
        room.connect(peer_id, dtls_parameters, rtp_capabilities)
            .await
    }

    /// Publish a stream from a peer
    pub async fn produce(
        &self,
        room_id: &RoomId,
        transport_id: &TransportId,
        peer_id: &PeerId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<Published> {
        require_non_empty("peer id", peer_id.as_str())?;
        let room = self.require_room(room_id)?;
        room.ensure_transport(transport_id)?;
        room.produce(peer_id, kind, rtp_parameters).await
    }

    /// Catch a peer up and return its consumers
    pub async fn list_consumers(&self, room_id: &RoomId, peer_id: &PeerId) -> Result<ConsumerMap> {
        self.require_room(room_id)?.list_consumers(peer_id).await
    }

    pub async fn resume_consumer(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        source: &PeerId,
        kind: MediaKind,
    ) -> Result<ConsumerId> {
        self.require_room(room_id)?
            .resume_consumer(peer_id, source, kind)
            .await
    }

    /// Remove a peer from a room. Absent rooms and peers are not an error.
    pub async fn delete_peer(&self, room_id: &RoomId, peer_id: &PeerId) -> Result<()> {
        if let Some(room) = self.room(room_id) {
            room.remove_peer(peer_id).await;
        } else {
            debug!(room_id = %room_id, peer_id = %peer_id, "Room not found when removing peer");
        }
        Ok(())
    }

    /// Get list of all active room IDs
    pub fn get_room_ids(&self) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Get number of active rooms
    pub fn room_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Aggregate statistics over every room
    pub async fn get_stats(&self) -> ManagerStats {
        let rooms: Vec<Arc<SfuRoom>> = self
            .rooms
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();

        let mut stats = ManagerStats {
            active_rooms: rooms.len(),
            ..Default::default()
        };
        for room in rooms {
            let room_stats = room.get_stats().await;
            stats.total_peers += room_stats.peer_count;
            stats.total_producers += room_stats.producer_count;
            stats.total_consumers += room_stats.consumer_count;
        }
        stats
    }

    /// Remove rooms without peers and close their transports.
    ///
    /// A room is kept while anything outside the registry still holds it.
    pub async fn sweep_empty_rooms(&self) -> usize {
        let mut removed = Vec::new();
        self.rooms.retain(|_, cell| match cell.get() {
            None => Arc::strong_count(cell) > 1,
            // A cell clone means a caller is about to take the room
            Some(room)
                if Arc::strong_count(cell) == 1
                    && Arc::strong_count(room) == 1
                    && room.is_idle() =>
            {
                removed.push(Arc::clone(room));
                false
            }
            Some(_) => true,
        });

        for room in &removed {
            debug!(room_id = %room.id, "Removed empty room");
            room.close().await;
        }

        if !removed.is_empty() {
            info!(
                removed_count = removed.len(),
                remaining_rooms = self.room_count(),
                "Cleaned up empty rooms"
            );
        }
        removed.len()
    }

    /// Stop background tasks
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        info!(rooms = self.room_count(), "SFU Manager shut down");
    }

    async fn sweep_task(manager: Weak<Self>, period: Duration, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "Starting empty room sweeper");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(manager) = manager.upgrade() else { break };
                    manager.sweep_empty_rooms().await;
                }
            }
        }
        debug!("Empty room sweeper stopped");
    }
}

impl Drop for SfuManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
