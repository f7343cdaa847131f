//! Inbound relay: decode network segments into a local sink.
//!
//! Segments are admitted without checking their signature unless
//! [`SubscribeConfig::expected_signer`] is set. Consumers that need
//! provenance can verify later with [`crate::attest::verify_segment`].

use std::sync::Arc;

use sp_core::H160;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vtn_types::{Segment, StreamId};

use crate::attest::verify_segment;
use crate::error::{VideoError, VideoResult};
use crate::network::{StreamItem, Subscriber, VideoNetwork};
use crate::stream::SegmentSink;
use crate::wire::decode_segment;

/// Configuration for [`SubscribeRelay`].
#[derive(Debug, Clone)]
pub struct SubscribeConfig {
    /// Capacity of the delivery queue handed to the network.
    pub queue_capacity: usize,
    /// Only admit segments signed by this account.
    pub expected_signer: Option<H160>,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            expected_signer: None,
        }
    }
}

/// Counters reported when a relay worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Segments handed to the sink.
    pub accepted: u64,
    /// Segments dropped on decode, verification or sink errors.
    pub dropped: u64,
    /// Whether the broadcaster signalled end of stream.
    pub finished: bool,
}

/// Handle to a running inbound relay.
#[derive(Debug)]
pub struct RelayHandle {
    stream_id: StreamId,
    worker: JoinHandle<RelayStats>,
}

impl RelayHandle {
    /// Stream being relayed.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its counters.
    pub async fn join(self) -> VideoResult<RelayStats> {
        self.worker
            .await
            .map_err(|e| VideoError::Network(format!("relay worker failed: {e}")))
    }

    /// Stop the worker immediately.
    pub fn abort(&self) {
        self.worker.abort();
    }
}

/// Receives attested segments for a stream and feeds a [`SegmentSink`].
#[derive(Clone)]
pub struct SubscribeRelay {
    network: Arc<dyn VideoNetwork>,
    config: SubscribeConfig,
}

impl SubscribeRelay {
    /// Create a relay.
    pub fn new(network: Arc<dyn VideoNetwork>, config: SubscribeConfig) -> Self {
        Self { network, config }
    }

    /// Same relay, admitting only segments signed by `signer`.
    pub fn with_verification(mut self, signer: H160) -> Self {
        self.config.expected_signer = Some(signer);
        self
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &SubscribeConfig {
        &self.config
    }

    /// Subscribe to `stream_id` and relay into `sink` until end of stream.
    pub async fn subscribe(
        &self,
        stream_id: &StreamId,
        sink: Arc<dyn SegmentSink>,
    ) -> VideoResult<RelayHandle> {
        let subscriber = self.network.subscriber(stream_id).await?;
        let (tx, queue) = mpsc::channel(self.config.queue_capacity.max(1));
        subscriber.subscribe(tx).await?;

        info!(stream_id = %stream_id, verified = self.config.expected_signer.is_some(), "Subscribed to stream");
        let worker = tokio::spawn(relay_stream(
            stream_id.clone(),
            subscriber,
            queue,
            sink,
            self.config.expected_signer,
        ));

        Ok(RelayHandle {
            stream_id: stream_id.clone(),
            worker,
        })
    }

    /// Unsubscribe from `stream_id`.
    pub async fn unsubscribe(&self, stream_id: &StreamId) -> VideoResult<()> {
        let subscriber = self
            .network
            .existing_subscriber(stream_id)
            .await
            .ok_or_else(|| VideoError::SubscriberNotFound(stream_id.to_string()))?;
        subscriber.unsubscribe().await?;
        info!(stream_id = %stream_id, "Unsubscribed from stream");
        Ok(())
    }
}

fn admit(
    stream_id: &StreamId,
    announced_seq: u64,
    payload: &[u8],
    expected_signer: Option<H160>,
) -> VideoResult<Segment> {
    let signed = decode_segment(payload)?;
    if signed.segment.seq_no != announced_seq {
        return Err(VideoError::Decode(format!(
            "envelope seq {} does not match announced seq {}",
            signed.segment.seq_no, announced_seq
        )));
    }
    if let Some(expected) = expected_signer {
        verify_segment(stream_id, &signed, expected)?;
    }
    Ok(signed.segment)
}

async fn relay_stream(
    stream_id: StreamId,
    subscriber: Arc<dyn Subscriber>,
    mut queue: mpsc::Receiver<StreamItem>,
    sink: Arc<dyn SegmentSink>,
    expected_signer: Option<H160>,
) -> RelayStats {
    let mut stats = RelayStats::default();

    while let Some(item) = queue.recv().await {
        match item {
            StreamItem::Data { seq_no, payload } => {
                let segment = match admit(&stream_id, seq_no, &payload, expected_signer) {
                    Ok(segment) => segment,
                    Err(e) => {
                        warn!(stream_id = %stream_id, seq_no, error = %e, "Dropping inbound segment");
                        stats.dropped += 1;
                        continue;
                    }
                };

                match sink.accept(segment).await {
                    Ok(()) => {
                        debug!(stream_id = %stream_id, seq_no, "Segment relayed");
                        stats.accepted += 1;
                    }
                    Err(e) => {
                        warn!(stream_id = %stream_id, seq_no, error = %e, "Sink rejected segment");
                        stats.dropped += 1;
                    }
                }
            }
            StreamItem::Eof => {
                if let Err(e) = subscriber.unsubscribe().await {
                    warn!(stream_id = %stream_id, error = %e, "Unsubscribe after end of stream failed");
                }
                sink.end().await;
                stats.finished = true;
                info!(
                    stream_id = %stream_id,
                    accepted = stats.accepted,
                    dropped = stats.dropped,
                    "Stream ended"
                );
                return stats;
            }
        }
    }

    debug!(stream_id = %stream_id, "Network closed delivery queue");
    stats
}
