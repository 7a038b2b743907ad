//! Media engine seam
//!
//! The orchestration core never touches media. Everything it needs from the
//! SFU engine is expressed by [`MediaEngine`]: create a transport, connect it,
//! produce, consume, resume and close. Handles cross this boundary as opaque
//! identifiers plus negotiation parameters.
//!
//! [`EngineClient`] is the glue used by rooms: it bounds every call with the
//! configured timeout and maps failures into [`SfuError`].

mod local;

pub use local::LocalEngine;

use crate::config::TransportOptions;
use crate::error::{EngineError, Result, SfuError};
use crate::types::{
    ConsumerId, ConsumerInfo, DtlsParameters, MediaKind, ProducerId, ProducerInfo,
    RtpCapabilities, RtpParameters, TransportId, TransportInfo,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Capabilities the orchestration layer requires from an SFU engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Static router capabilities (codecs, header extensions) offered to clients
    fn rtp_capabilities(&self) -> RtpCapabilities;

    async fn create_transport(
        &self,
        options: &TransportOptions,
    ) -> std::result::Result<TransportInfo, EngineError>;

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> std::result::Result<(), EngineError>;

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> std::result::Result<ProducerInfo, EngineError>;

    /// Create a consumer of `producer_id` for a peer with `rtp_capabilities`.
    /// Fails with [`EngineError::Rejected`] when the capabilities cannot
    /// receive the producer.
    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
        paused: bool,
    ) -> std::result::Result<ConsumerInfo, EngineError>;

    async fn resume_consumer(&self, consumer_id: &ConsumerId)
        -> std::result::Result<(), EngineError>;

    async fn close_producer(&self, producer_id: &ProducerId)
        -> std::result::Result<(), EngineError>;

    async fn close_consumer(&self, consumer_id: &ConsumerId)
        -> std::result::Result<(), EngineError>;

    async fn close_transport(&self, transport_id: &TransportId)
        -> std::result::Result<(), EngineError>;
}

/// Timeout-bounded access to a shared [`MediaEngine`]
#[derive(Clone)]
pub struct EngineClient {
    engine: Arc<dyn MediaEngine>,
    timeout: Duration,
}

impl EngineClient {
    pub fn new(engine: Arc<dyn MediaEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(SfuError::Engine { op, source }),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Engine call timed out");
                Err(SfuError::Timeout { op })
            }
        }
    }

    #[must_use]
    pub fn rtp_capabilities(&self) -> RtpCapabilities {
        self.engine.rtp_capabilities()
    }

    pub async fn create_transport(&self, options: &TransportOptions) -> Result<TransportInfo> {
        self.call("create_transport", self.engine.create_transport(options))
            .await
    }

    pub async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: &DtlsParameters,
    ) -> Result<()> {
        self.call(
            "connect_transport",
            self.engine.connect_transport(transport_id, dtls_parameters),
        )
        .await
    }

    pub async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<ProducerInfo> {
        self.call(
            "produce",
            self.engine.produce(transport_id, kind, rtp_parameters),
        )
        .await
    }

    pub async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerInfo> {
        // Consumers always start paused; the receiving peer resumes explicitly.
        self.call(
            "consume",
            self.engine
                .consume(transport_id, producer_id, rtp_capabilities, true),
        )
        .await
    }

    pub async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<()> {
        self.call("resume_consumer", self.engine.resume_consumer(consumer_id))
            .await
    }

    /// Close a producer, logging instead of failing
    pub async fn close_producer(&self, producer_id: &ProducerId) {
        if let Err(e) = self
            .call("close_producer", self.engine.close_producer(producer_id))
            .await
        {
            warn!(producer_id = %producer_id, error = %e, "Failed to close producer");
        }
    }

    /// Close a consumer, logging instead of failing
    pub async fn close_consumer(&self, consumer_id: &ConsumerId) {
        if let Err(e) = self
            .call("close_consumer", self.engine.close_consumer(consumer_id))
            .await
        {
            warn!(consumer_id = %consumer_id, error = %e, "Failed to close consumer");
        }
    }

    /// Close a transport, logging instead of failing
    pub async fn close_transport(&self, transport_id: &TransportId) {
        if let Err(e) = self
            .call("close_transport", self.engine.close_transport(transport_id))
            .await
        {
            warn!(transport_id = %transport_id, error = %e, "Failed to close transport");
        }
    }
}
