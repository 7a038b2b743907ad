//! In-process media engine
//!
//! Allocates transports, producers and consumers and tracks their lifecycle
//! the way a real SFU worker would, without moving any media. Used for local
//! development of the signaling flow and as the engine in tests.

use super::MediaEngine;
use crate::config::TransportOptions;
use crate::error::EngineError;
use crate::types::{
    ConsumerId, ConsumerInfo, DtlsParameters, MediaKind, ProducerId, ProducerInfo,
    RtpCapabilities, RtpParameters, TransportId, TransportInfo,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct LocalTransport {
    dtls_parameters: Option<DtlsParameters>,
}

struct LocalProducer {
    kind: MediaKind,
}

struct LocalConsumer {
    producer_id: ProducerId,
    paused: bool,
}

#[derive(Default)]
struct LocalState {
    transports: HashMap<TransportId, LocalTransport>,
    producers: HashMap<ProducerId, LocalProducer>,
    consumers: HashMap<ConsumerId, LocalConsumer>,
    transports_created: usize,
}

/// Handle-allocating engine that runs inside the orchestrator process
pub struct LocalEngine {
    capabilities: RtpCapabilities,
    state: Mutex<LocalState>,
    /// Transports allocated so far, picks the next port in the range
    allocations: AtomicU64,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: default_capabilities(),
            state: Mutex::new(LocalState::default()),
            allocations: AtomicU64::new(0),
        }
    }

    /// Number of transports created since start (closed ones included)
    #[must_use]
    pub fn transports_created(&self) -> usize {
        self.state.lock().transports_created
    }

    #[must_use]
    pub fn open_transports(&self) -> usize {
        self.state.lock().transports.len()
    }

    #[must_use]
    pub fn is_transport_connected(&self, transport_id: &TransportId) -> bool {
        self.state
            .lock()
            .transports
            .get(transport_id)
            .is_some_and(|t| t.dtls_parameters.is_some())
    }

    #[must_use]
    pub fn open_producers(&self) -> usize {
        self.state.lock().producers.len()
    }

    #[must_use]
    pub fn open_consumers(&self) -> usize {
        self.state.lock().consumers.len()
    }

    #[must_use]
    pub fn is_producer_open(&self, producer_id: &ProducerId) -> bool {
        self.state.lock().producers.contains_key(producer_id)
    }

    /// `None` once the consumer is closed
    #[must_use]
    pub fn consumer_paused(&self, consumer_id: &ConsumerId) -> Option<bool> {
        self.state
            .lock()
            .consumers
            .get(consumer_id)
            .map(|c| c.paused)
    }

    fn ice_candidates(&self, options: &TransportOptions, port: u16) -> Vec<Value> {
        let mut protocols = Vec::new();
        if options.enable_udp {
            protocols.push("udp");
        }
        if options.enable_tcp {
            protocols.push("tcp");
        }
        if !options.prefer_udp {
            protocols.reverse();
        }

        let mut candidates = Vec::new();
        for listen in &options.listen_ips {
            let ip = listen.announced_ip.as_deref().unwrap_or(&listen.ip);
            for (rank, protocol) in protocols.iter().enumerate() {
                let mut candidate = json!({
                    "foundation": format!("{protocol}candidate"),
                    "priority": 1_076_302_079u32 - rank as u32 * 1000,
                    "ip": ip,
                    "address": ip,
                    "protocol": protocol,
                    "port": port,
                    "type": "host",
                });
                if *protocol == "tcp" {
                    candidate["tcpType"] = json!("passive");
                }
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// Opus + VP8, mirroring a typical router codec set
fn default_capabilities() -> RtpCapabilities {
    RtpCapabilities(json!({
        "codecs": [
            {
                "kind": "audio",
                "mimeType": "audio/opus",
                "preferredPayloadType": 100,
                "clockRate": 48000,
                "channels": 2,
                "parameters": {},
                "rtcpFeedback": [{ "type": "transport-cc", "parameter": "" }]
            },
            {
                "kind": "video",
                "mimeType": "video/VP8",
                "preferredPayloadType": 101,
                "clockRate": 90000,
                "parameters": {},
                "rtcpFeedback": [
                    { "type": "nack", "parameter": "" },
                    { "type": "nack", "parameter": "pli" },
                    { "type": "ccm", "parameter": "fir" },
                    { "type": "goog-remb", "parameter": "" },
                    { "type": "transport-cc", "parameter": "" }
                ]
            }
        ],
        "headerExtensions": []
    }))
}

/// Codecs of `kind` advertised in a peer's capabilities
fn codecs_for(capabilities: &RtpCapabilities, kind: MediaKind) -> Vec<Value> {
    let prefix = format!("{}/", kind.as_str());
    capabilities
        .0
        .get("codecs")
        .and_then(Value::as_array)
        .map(|codecs| {
            codecs
                .iter()
                .filter(|codec| {
                    codec.get("kind").and_then(Value::as_str) == Some(kind.as_str())
                        || codec
                            .get("mimeType")
                            .and_then(Value::as_str)
                            .is_some_and(|mime| mime.to_ascii_lowercase().starts_with(&prefix))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl MediaEngine for LocalEngine {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    async fn create_transport(
        &self,
        options: &TransportOptions,
    ) -> Result<TransportInfo, EngineError> {
        if options.listen_ips.is_empty() {
            return Err(EngineError::Rejected("no listen ips".to_string()));
        }
        if !options.enable_udp && !options.enable_tcp {
            return Err(EngineError::Rejected(
                "neither udp nor tcp enabled".to_string(),
            ));
        }

        let port = options.port_for(self.allocations.fetch_add(1, Ordering::Relaxed));
        let id = TransportId::new(nanoid::nanoid!());
        let info = TransportInfo {
            id: id.clone(),
            ice_parameters: json!({
                "usernameFragment": nanoid::nanoid!(16),
                "password": nanoid::nanoid!(32),
                "iceLite": true,
            }),
            ice_candidates: Value::Array(self.ice_candidates(options, port)),
            dtls_parameters: json!({
                "role": "auto",
                "fingerprints": [{
                    "algorithm": "sha-256",
                    "value": nanoid::nanoid!(64, &nanoid::alphabet::SAFE),
                }],
            }),
            sctp_parameters: None,
        };

        let mut state = self.state.lock();
        state.transports.insert(
            id.clone(),
            LocalTransport {
                dtls_parameters: None,
            },
        );
        state.transports_created += 1;
        debug!(transport_id = %id, port, "Local transport created");

        Ok(info)
    }

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let transport = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| EngineError::Rejected(format!("transport {transport_id} not found")))?;

        if transport.dtls_parameters.is_some() {
            return Err(EngineError::Rejected(format!(
                "transport {transport_id} already connected"
            )));
        }
        transport.dtls_parameters = Some(dtls_parameters.clone());
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        _rtp_parameters: &RtpParameters,
    ) -> Result<ProducerInfo, EngineError> {
        let mut state = self.state.lock();
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::Rejected(format!(
                "transport {transport_id} not found"
            )));
        }

        let id = ProducerId::new(nanoid::nanoid!());
        state.producers.insert(id.clone(), LocalProducer { kind });

        // The engine echoes the negotiated parameters; the local engine has
        // nothing to negotiate, so the router's codecs stand in for them.
        let rtp_parameters = RtpParameters(json!({
            "codecs": codecs_for(&self.capabilities, kind),
            "encodings": [{ "ssrc": ssrc_for(&id) }],
        }));

        Ok(ProducerInfo {
            id,
            kind,
            rtp_parameters,
        })
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
        paused: bool,
    ) -> Result<ConsumerInfo, EngineError> {
        let mut state = self.state.lock();
        if !state.transports.contains_key(transport_id) {
            return Err(EngineError::Rejected(format!(
                "transport {transport_id} not found"
            )));
        }
        let kind = state
            .producers
            .get(producer_id)
            .map(|p| p.kind)
            .ok_or_else(|| EngineError::Rejected(format!("producer {producer_id} not found")))?;

        let codecs = codecs_for(rtp_capabilities, kind);
        if codecs.is_empty() {
            return Err(EngineError::Rejected(format!(
                "capabilities cannot consume {kind} producer {producer_id}"
            )));
        }

        let id = ConsumerId::new(nanoid::nanoid!());
        state.consumers.insert(
            id.clone(),
            LocalConsumer {
                producer_id: producer_id.clone(),
                paused,
            },
        );

        Ok(ConsumerInfo {
            id,
            producer_id: producer_id.clone(),
            kind,
            rtp_parameters: RtpParameters(json!({
                "codecs": codecs,
                "encodings": [{ "ssrc": ssrc_for(producer_id) }],
            })),
        })
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| EngineError::Rejected(format!("consumer {consumer_id} not found")))?;
        consumer.paused = false;
        Ok(())
    }

    async fn close_producer(&self, producer_id: &ProducerId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.producers.remove(producer_id).is_some() {
            // Consumers die with their producer.
            state
                .consumers
                .retain(|_, consumer| &consumer.producer_id != producer_id);
        }
        Ok(())
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) -> Result<(), EngineError> {
        self.state.lock().consumers.remove(consumer_id);
        Ok(())
    }

    async fn close_transport(&self, transport_id: &TransportId) -> Result<(), EngineError> {
        self.state.lock().transports.remove(transport_id);
        Ok(())
    }
}

/// Stable pseudo-SSRC derived from an id
fn ssrc_for(id: &ProducerId) -> u32 {
    id.as_str()
        .bytes()
        .fold(2_166_136_261u32, |hash, b| (hash ^ u32::from(b)).wrapping_mul(16_777_619))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SfuConfig;

    fn audio_only() -> RtpCapabilities {
        RtpCapabilities(json!({
            "codecs": [{ "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000 }]
        }))
    }

    #[tokio::test]
    async fn test_transport_candidates_follow_options() {
        let engine = LocalEngine::new();
        let mut options = SfuConfig::default().transport_options();
        options.enable_tcp = false;

        let transport = engine.create_transport(&options).await.unwrap();
        let candidates = transport.ice_candidates.as_array().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0]["protocol"], "udp");
        assert_eq!(candidates[0]["ip"], "127.0.0.1");
        assert_eq!(engine.transports_created(), 1);
    }

    #[tokio::test]
    async fn test_transport_ports_stay_in_range() {
        let engine = LocalEngine::new();
        let options = SfuConfig {
            rtc_min_port: 41000,
            rtc_max_port: 41001,
            enable_tcp: false,
            ..SfuConfig::default()
        }
        .transport_options();

        let mut ports = Vec::new();
        for _ in 0..3 {
            let transport = engine.create_transport(&options).await.unwrap();
            ports.push(transport.ice_candidates[0]["port"].as_u64().unwrap());
        }
        assert_eq!(ports, vec![41000, 41001, 41000]);
    }

    #[tokio::test]
    async fn test_connect_only_once() {
        let engine = LocalEngine::new();
        let transport = engine
            .create_transport(&SfuConfig::default().transport_options())
            .await
            .unwrap();
        let dtls = DtlsParameters(json!({ "role": "client" }));

        engine.connect_transport(&transport.id, &dtls).await.unwrap();
        assert!(engine.is_transport_connected(&transport.id));
        assert!(engine.connect_transport(&transport.id, &dtls).await.is_err());
    }

    #[tokio::test]
    async fn test_consume_checks_capabilities() {
        let engine = LocalEngine::new();
        let transport = engine
            .create_transport(&SfuConfig::default().transport_options())
            .await
            .unwrap();
        let producer = engine
            .produce(&transport.id, MediaKind::Video, &RtpParameters::default())
            .await
            .unwrap();

        let rejected = engine
            .consume(&transport.id, &producer.id, &audio_only(), true)
            .await;
        assert!(matches!(rejected, Err(EngineError::Rejected(_))));

        let consumer = engine
            .consume(&transport.id, &producer.id, &engine.rtp_capabilities(), true)
            .await
            .unwrap();
        assert_eq!(consumer.kind, MediaKind::Video);
        assert_eq!(engine.consumer_paused(&consumer.id), Some(true));

        engine.resume_consumer(&consumer.id).await.unwrap();
        assert_eq!(engine.consumer_paused(&consumer.id), Some(false));
    }

    #[tokio::test]
    async fn test_closing_producer_closes_its_consumers() {
        let engine = LocalEngine::new();
        let transport = engine
            .create_transport(&SfuConfig::default().transport_options())
            .await
            .unwrap();
        let producer = engine
            .produce(&transport.id, MediaKind::Audio, &RtpParameters::default())
            .await
            .unwrap();
        let consumer = engine
            .consume(&transport.id, &producer.id, &audio_only(), true)
            .await
            .unwrap();

        engine.close_producer(&producer.id).await.unwrap();
        assert!(!engine.is_producer_open(&producer.id));
        assert_eq!(engine.consumer_paused(&consumer.id), None);
        // Closing twice is harmless
        engine.close_producer(&producer.id).await.unwrap();
    }
}
