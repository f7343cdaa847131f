//! Wire envelope for attested segments.

use std::time::Duration;

use codec::{Decode, Encode};
use vtn_types::{Segment, SignedSegment};

use crate::error::{VideoError, VideoResult};

/// Envelope format version.
pub const SEGMENT_ENVELOPE_VERSION: u16 = 1;

/// SCALE encoded form of a [`SignedSegment`].
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SegmentEnvelope {
    /// Format version.
    pub version: u16,
    /// Sequence number.
    pub seq_no: u64,
    /// Segment name.
    pub name: String,
    /// Payload.
    pub data: Vec<u8>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// 65-byte recoverable signature.
    pub signature: Vec<u8>,
}

/// Encode a signed segment for the network.
pub fn encode_segment(signed: &SignedSegment) -> Vec<u8> {
    SegmentEnvelope {
        version: SEGMENT_ENVELOPE_VERSION,
        seq_no: signed.segment.seq_no,
        name: signed.segment.name.clone(),
        data: signed.segment.data.clone(),
        duration_ms: u64::try_from(signed.segment.duration.as_millis()).unwrap_or(u64::MAX),
        signature: signed.signature.clone(),
    }
    .encode()
}

/// Decode a signed segment received from the network.
pub fn decode_segment(bytes: &[u8]) -> VideoResult<SignedSegment> {
    let envelope = SegmentEnvelope::decode(&mut &bytes[..])
        .map_err(|err| VideoError::Decode(err.to_string()))?;
    if envelope.version != SEGMENT_ENVELOPE_VERSION {
        return Err(VideoError::UnsupportedVersion(envelope.version));
    }

    Ok(SignedSegment {
        segment: Segment {
            seq_no: envelope.seq_no,
            name: envelope.name,
            data: envelope.data,
            duration: Duration::from_millis(envelope.duration_ms),
        },
        signature: envelope.signature,
    })
}
