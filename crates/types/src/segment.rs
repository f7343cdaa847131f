//! Media segments and the attestation hash that binds them to a stream.

use std::time::Duration;

use sp_core::hashing::keccak_256;

use crate::ids::StreamId;

/// One media chunk of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number, monotonic per stream.
    pub seq_no: u64,
    /// Human readable name.
    pub name: String,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Playback duration.
    pub duration: Duration,
}

impl Segment {
    /// Create a segment.
    pub fn new(seq_no: u64, name: impl Into<String>, data: Vec<u8>, duration: Duration) -> Self {
        Self {
            seq_no,
            name: name.into(),
            data,
            duration,
        }
    }
}

/// A segment plus the 65-byte recoverable signature over its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSegment {
    /// The attested segment.
    pub segment: Segment,
    /// `r ‖ s ‖ v` signature.
    pub signature: Vec<u8>,
}

/// Attestation hash of a segment:
/// `keccak256(stream_id ‖ uint256(seq_no) ‖ keccak256(data))`.
pub fn segment_hash(stream_id: &StreamId, seq_no: u64, data: &[u8]) -> [u8; 32] {
    let stream = stream_id.to_string();
    let mut seq = [0u8; 32];
    seq[24..].copy_from_slice(&seq_no.to_be_bytes());

    let mut preimage = Vec::with_capacity(stream.len() + 64);
    preimage.extend_from_slice(stream.as_bytes());
    preimage.extend_from_slice(&seq);
    preimage.extend_from_slice(&keccak_256(data));

    keccak_256(&preimage)
}
