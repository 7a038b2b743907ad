//! Conclave SFU orchestration
//!
//! This crate coordinates rooms of peers on top of a media engine. The engine
//! moves the media; this layer decides who gets which stream. Every published
//! stream is fanned out to every other peer in the room as a paused consumer,
//! late joiners catch up on demand, and departures are cleaned up and
//! announced.
//!
//! ## Architecture
//!
//! - **`SfuManager`**: Room registry, one engine transport per room
//! - **`SfuRoom`**: Peer registry of a single room and the publish flow
//! - **`MediaEngine`**: Seam to the engine that owns transports, producers
//!   and consumers
//! - **`Notifier`**: Out-of-band delivery of `addConsumer` / `removeConsumer`
//!   events to peers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conclave_sfu::{LocalEngine, NoopNotifier, SfuConfig, SfuManager};
//!
//! let manager = SfuManager::new(
//!     SfuConfig::default(),
//!     Arc::new(LocalEngine::new()),
//!     Arc::new(NoopNotifier),
//! );
//! let room = manager.get_or_create_room(&"r1".into()).await?;
//! manager
//!     .connect(&room.id, &room.transport().id, &"p1".into(), dtls, caps)
//!     .await?;
//! ```

mod config;
mod engine;
mod error;
mod fanout;
mod manager;
mod notify;
mod peer;
mod room;
mod types;

pub use config::{ListenIp, SfuConfig, TransportOptions};
pub use engine::{EngineClient, LocalEngine, MediaEngine};
pub use error::{EngineError, Result, SfuError};
pub use fanout::{FanoutHandle, FanoutReport};
pub use manager::{ManagerStats, SfuManager};
pub use notify::{NoopNotifier, Notifier, PeerEvent};
pub use peer::{ConsumerMap, Peer};
pub use room::{Delivery, Published, RoomStats, SfuRoom};
pub use types::{
    ConsumerId, ConsumerInfo, DtlsParameters, MediaKind, PeerId, ProducerId, ProducerInfo,
    RoomId, RtpCapabilities, RtpParameters, TransportId, TransportInfo,
};
