//! Outbound relay: attest segments and push them to subscribers.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vtn_types::{Segment, StreamId};

use crate::attest::SegmentAttestor;
use crate::error::VideoResult;
use crate::network::VideoNetwork;
use crate::wire::encode_segment;

/// Report for a batch of broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Segments handed to the network.
    pub published: u32,
    /// Segments that failed to sign or send.
    pub failed: u32,
    /// Payload bytes published.
    pub bytes: u64,
}

/// Signs every segment and pushes it onto the stream's broadcaster.
#[derive(Clone)]
pub struct BroadcastRelay {
    network: Arc<dyn VideoNetwork>,
    attestor: SegmentAttestor,
}

impl BroadcastRelay {
    /// Create a relay.
    pub fn new(network: Arc<dyn VideoNetwork>, attestor: SegmentAttestor) -> Self {
        Self { network, attestor }
    }

    /// Attestor used for signing.
    pub fn attestor(&self) -> &SegmentAttestor {
        &self.attestor
    }

    /// Sign `segment` and broadcast it on `stream_id`.
    pub async fn broadcast(&self, stream_id: &StreamId, segment: Segment) -> VideoResult<()> {
        let seq_no = segment.seq_no;
        let signed = self.attestor.sign(stream_id, segment)?;
        let payload = encode_segment(&signed);
        let size = payload.len();

        let broadcaster = self.network.broadcaster(stream_id).await?;
        if let Err(e) = broadcaster.broadcast(seq_no, payload).await {
            warn!(stream_id = %stream_id, seq_no, error = %e, "Segment broadcast failed");
            return Err(e);
        }

        debug!(stream_id = %stream_id, seq_no, bytes = size, "Segment broadcast");
        Ok(())
    }

    /// Broadcast a batch, continuing past failures.
    pub async fn broadcast_all(
        &self,
        stream_id: &StreamId,
        segments: impl IntoIterator<Item = Segment>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for segment in segments {
            let len = segment.data.len() as u64;
            match self.broadcast(stream_id, segment).await {
                Ok(()) => {
                    report.published += 1;
                    report.bytes += len;
                }
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Signal end of stream to subscribers.
    ///
    /// Later broadcasts on the same stream are not prevented here.
    pub async fn finish(&self, stream_id: &StreamId) -> VideoResult<()> {
        let broadcaster = self.network.broadcaster(stream_id).await?;
        broadcaster.finish().await?;
        info!(stream_id = %stream_id, "Stream finished");
        Ok(())
    }
}
