//! Per-room peer state
//!
//! A peer owns its published producers (one per media kind) and the consumers
//! created for it, keyed by the producing peer and the media kind. All
//! mutation happens under the owning room's lock.

use crate::types::{ConsumerInfo, MediaKind, PeerId, ProducerInfo, RtpCapabilities};
use std::collections::HashMap;

/// Consumers held by one peer: producing peer -> kind -> consumer
pub type ConsumerMap = HashMap<PeerId, HashMap<MediaKind, ConsumerInfo>>;

#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    rtp_capabilities: Option<RtpCapabilities>,
    producers: HashMap<MediaKind, ProducerInfo>,
    consumers: ConsumerMap,
}

impl Peer {
    #[must_use]
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            rtp_capabilities: None,
            producers: HashMap::new(),
            consumers: HashMap::new(),
        }
    }

    /// Record receive capabilities, keeping producers and consumers intact
    pub fn set_rtp_capabilities(&mut self, capabilities: RtpCapabilities) {
        self.rtp_capabilities = Some(capabilities);
    }

    #[must_use]
    pub const fn rtp_capabilities(&self) -> Option<&RtpCapabilities> {
        self.rtp_capabilities.as_ref()
    }

    /// Store a producer, returning the one it replaced
    pub fn insert_producer(&mut self, producer: ProducerInfo) -> Option<ProducerInfo> {
        self.producers.insert(producer.kind, producer)
    }

    #[must_use]
    pub fn producer(&self, kind: MediaKind) -> Option<&ProducerInfo> {
        self.producers.get(&kind)
    }

    pub fn producers(&self) -> impl Iterator<Item = &ProducerInfo> {
        self.producers.values()
    }

    #[must_use]
    pub fn consumer(&self, source: &PeerId, kind: MediaKind) -> Option<&ConsumerInfo> {
        self.consumers.get(source).and_then(|by_kind| by_kind.get(&kind))
    }

    /// Store a consumer of `source`'s stream, returning the one it replaced
    pub fn insert_consumer(&mut self, source: PeerId, consumer: ConsumerInfo) -> Option<ConsumerInfo> {
        self.consumers
            .entry(source)
            .or_default()
            .insert(consumer.kind, consumer)
    }

    /// Drop every consumer of `source`'s streams
    pub fn remove_consumers_from(&mut self, source: &PeerId) -> Vec<ConsumerInfo> {
        self.consumers
            .remove(source)
            .map(|by_kind| by_kind.into_values().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn consumer_map(&self) -> ConsumerMap {
        self.consumers.clone()
    }

    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.values().map(HashMap::len).sum()
    }

    /// Consume the peer, yielding every handle it owned
    #[must_use]
    pub fn into_handles(self) -> (Vec<ProducerInfo>, Vec<ConsumerInfo>) {
        let producers = self.producers.into_values().collect();
        let consumers = self
            .consumers
            .into_values()
            .flat_map(HashMap::into_values)
            .collect();
        (producers, consumers)
    }
}
