//! Segment attestation.
//!
//! A signature binds the signing account to one sequence position of one
//! stream and to the payload digest. Changing any of the three makes the
//! recovered signer differ.

use std::sync::Arc;

use sp_core::H160;
use vtn_types::{recover_address, segment_hash, AccountSigner, Segment, SignedSegment, StreamId};

use crate::error::{VideoError, VideoResult};

/// Signs segments with the node account.
#[derive(Clone)]
pub struct SegmentAttestor {
    signer: Arc<dyn AccountSigner>,
}

impl SegmentAttestor {
    /// Attest with `signer`.
    pub fn new(signer: Arc<dyn AccountSigner>) -> Self {
        Self { signer }
    }

    /// Address of the signing account.
    pub fn address(&self) -> H160 {
        self.signer.address()
    }

    /// Sign `segment` as part of `stream_id`.
    pub fn sign(&self, stream_id: &StreamId, segment: Segment) -> VideoResult<SignedSegment> {
        let digest = segment_hash(stream_id, segment.seq_no, &segment.data);
        let signature = self.signer.sign_digest(&digest)?;
        Ok(SignedSegment {
            segment,
            signature: signature.to_vec(),
        })
    }
}

/// Recover the account that signed `signed` as part of `stream_id`.
pub fn recover_signer(stream_id: &StreamId, signed: &SignedSegment) -> VideoResult<H160> {
    let digest = segment_hash(stream_id, signed.segment.seq_no, &signed.segment.data);
    Ok(recover_address(&digest, &signed.signature)?)
}

/// Check that `signed` was produced by `expected` for `stream_id`.
pub fn verify_segment(stream_id: &StreamId, signed: &SignedSegment, expected: H160) -> VideoResult<()> {
    let actual = recover_signer(stream_id, signed)?;
    if actual != expected {
        return Err(VideoError::SignerMismatch { expected, actual });
    }
    Ok(())
}
