//! Publish fan-out
//!
//! When a peer publishes, every other peer with known capabilities gets its
//! own consumer. Each target is handled by an independent task so that one
//! failing target neither blocks nor aborts the others, and the publisher's
//! response never waits for any of them.

use crate::room::{Delivery, SfuRoom};
use crate::types::{PeerId, ProducerInfo, RtpCapabilities};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Outcome of one fan-out, per target peer
#[derive(Debug, Default, Clone)]
pub struct FanoutReport {
    /// Peers that received a new consumer and an `addConsumer` push
    pub created: Vec<PeerId>,
    /// Peers skipped because they left, already held the consumer, or the
    /// producer was replaced in the meantime
    pub skipped: Vec<PeerId>,
    /// Peers whose consumer could not be created
    pub failed: Vec<(PeerId, String)>,
}

/// Background fan-out started by a publish
///
/// Dropping the handle detaches the fan-out; it still runs to completion.
#[derive(Debug)]
pub struct FanoutHandle(JoinHandle<FanoutReport>);

impl FanoutHandle {
    /// Wait for every target to be handled
    pub async fn join(self) -> FanoutReport {
        match self.0.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Fan-out supervisor failed");
                FanoutReport::default()
            }
        }
    }
}

pub(crate) fn spawn(
    room: Arc<SfuRoom>,
    source: PeerId,
    producer: ProducerInfo,
    replaced: Option<ProducerInfo>,
    targets: Vec<(PeerId, RtpCapabilities)>,
) -> FanoutHandle {
    FanoutHandle(tokio::spawn(async move {
        if let Some(old) = replaced {
            debug!(
                room_id = %room.id,
                peer_id = %source,
                producer_id = %old.id,
                "Closing replaced producer"
            );
            room.engine().close_producer(&old.id).await;
        }

        let mut tasks = JoinSet::new();
        for (target, capabilities) in targets {
            let room = Arc::clone(&room);
            let source = source.clone();
            let producer = producer.clone();
            tasks.spawn(async move {
                let result = room
                    .consume_for(&target, &capabilities, &source, &producer, true)
                    .await;
                (target, result)
            });
        }

        let mut report = FanoutReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((target, Ok(Delivery::Created))) => report.created.push(target),
                Ok((target, Ok(delivery))) => {
                    debug!(
                        room_id = %room.id,
                        target = %target,
                        ?delivery,
                        "Fan-out target skipped"
                    );
                    report.skipped.push(target);
                }
                Ok((target, Err(e))) => {
                    warn!(
                        room_id = %room.id,
                        source = %source,
                        target = %target,
                        kind = %producer.kind,
                        error = %e,
                        "Failed to create consumer for peer"
                    );
                    report.failed.push((target, e.to_string()));
                }
                Err(e) => error!(room_id = %room.id, error = %e, "Fan-out task panicked"),
            }
        }

        info!(
            room_id = %room.id,
            source = %source,
            kind = %producer.kind,
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Fan-out complete"
        );
        report
    }))
}
