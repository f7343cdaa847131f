//! Transcode pipeline: subscribe to a source stream, transcode each segment
//! and broadcast every rendition on its own result stream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use vtn_types::{Segment, StreamId, VideoProfile};

use crate::broadcast::BroadcastRelay;
use crate::error::{VideoError, VideoResult};
use crate::manifest::ManifestSync;
use crate::network::{TranscodeResponse, VideoNetwork};
use crate::stream::SegmentSink;
use crate::subscribe::{RelayHandle, SubscribeRelay};

/// Video transcoding engine.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce one output per profile, in the same order.
    async fn transcode(
        &self,
        payload: Vec<u8>,
        profiles: &[VideoProfile],
    ) -> VideoResult<Vec<Vec<u8>>>;
}

struct TranscodeSink {
    transcoder: Arc<dyn Transcoder>,
    relay: BroadcastRelay,
    outputs: Vec<(StreamId, VideoProfile)>,
    profiles: Vec<VideoProfile>,
}

#[async_trait]
impl SegmentSink for TranscodeSink {
    async fn accept(&self, segment: Segment) -> VideoResult<()> {
        let seq_no = segment.seq_no;
        let renditions = self.transcoder.transcode(segment.data, &self.profiles).await?;

        for (index, (stream_id, profile)) in self.outputs.iter().enumerate() {
            let Some(data) = renditions.get(index) else {
                warn!(stream_id = %stream_id, profile = profile.name, seq_no, "Transcoder returned no output");
                continue;
            };

            let rendition = Segment::new(
                seq_no,
                format!("{stream_id}_{seq_no}.ts"),
                data.clone(),
                segment.duration,
            );
            if let Err(e) = self.relay.broadcast(stream_id, rendition).await {
                warn!(stream_id = %stream_id, seq_no, error = %e, "Failed to broadcast rendition");
            }
        }
        Ok(())
    }

    async fn end(&self) {
        for (stream_id, _) in &self.outputs {
            if let Err(e) = self.relay.finish(stream_id).await {
                warn!(stream_id = %stream_id, error = %e, "Failed to finish result stream");
            }
        }
    }
}

/// A running transcode of one source stream.
#[derive(Debug)]
pub struct TranscodeSession {
    /// Source stream.
    pub source: StreamId,
    /// Result stream id to profile name.
    pub results: TranscodeResponse,
    /// Inbound relay driving the session.
    pub handle: RelayHandle,
}

/// Wires the inbound relay, a transcoder and the outbound relay together.
#[derive(Clone)]
pub struct TranscodePipeline {
    network: Arc<dyn VideoNetwork>,
    transcoder: Arc<dyn Transcoder>,
    broadcast: BroadcastRelay,
    subscribe: SubscribeRelay,
    manifests: ManifestSync,
}

impl TranscodePipeline {
    /// Create a pipeline.
    pub fn new(
        network: Arc<dyn VideoNetwork>,
        transcoder: Arc<dyn Transcoder>,
        broadcast: BroadcastRelay,
        subscribe: SubscribeRelay,
        manifests: ManifestSync,
    ) -> Self {
        Self {
            network,
            transcoder,
            broadcast,
            subscribe,
            manifests,
        }
    }

    /// Transcode `source` into `profiles` and notify its broadcaster.
    pub async fn start(
        &self,
        source: &StreamId,
        profiles: &[VideoProfile],
    ) -> VideoResult<TranscodeSession> {
        if profiles.is_empty() {
            return Err(VideoError::Transcode("no profiles requested".into()));
        }

        let node = self.network.node_id();
        let outputs: Vec<_> = profiles
            .iter()
            .map(|p| (StreamId::mint(&node, p.name), *p))
            .collect();
        let results: TranscodeResponse = outputs
            .iter()
            .map(|(id, p)| (id.to_string(), p.name.to_string()))
            .collect();

        let sink = Arc::new(TranscodeSink {
            transcoder: Arc::clone(&self.transcoder),
            relay: self.broadcast.clone(),
            outputs,
            profiles: profiles.to_vec(),
        });
        let handle = self.subscribe.subscribe(source, sink).await?;

        info!(stream_id = %source, renditions = results.len(), "Transcode started");
        self.manifests
            .notify_broadcaster(source.node_id(), source, results.clone())
            .await?;

        Ok(TranscodeSession {
            source: source.clone(),
            results,
            handle,
        })
    }
}
