//! Error types for the video data plane.

use sp_core::H160;
use thiserror::Error;
use vtn_types::TypesError;

/// Top-level error type for video relay operations.
#[derive(Debug, Error)]
pub enum VideoError {
    /// Network capability failed.
    #[error("network error: {0}")]
    Network(String),

    /// No subscriber is registered for the stream.
    #[error("subscriber not found for stream {0}")]
    SubscriberNotFound(String),

    /// Segment envelope could not be decoded.
    #[error("segment decode failed: {0}")]
    Decode(String),

    /// Envelope carries a format version this node does not speak.
    #[error("unsupported segment version {0}")]
    UnsupportedVersion(u16),

    /// Signature recovery succeeded but yielded an unexpected signer.
    #[error("segment signed by {actual:?}, expected {expected:?}")]
    SignerMismatch {
        /// Expected account.
        expected: H160,
        /// Recovered account.
        actual: H160,
    },

    /// Stream was ended and accepts no more segments.
    #[error("stream {0} has ended")]
    StreamEnded(String),

    /// Segment with this sequence number is already buffered.
    #[error("duplicate segment {seq_no}")]
    DuplicateSegment {
        /// Sequence number.
        seq_no: u64,
    },

    /// Segment is older than the retained window.
    #[error("segment {seq_no} is older than the buffered window")]
    StaleSegment {
        /// Sequence number.
        seq_no: u64,
    },

    /// Manifest publication needs exactly one source stream.
    #[error("manifest must contain exactly one stream, found {0}")]
    ManifestStreamCount(usize),

    /// Variant could not be added to a manifest.
    #[error("invalid variant: {0}")]
    InvalidVariant(String),

    /// Remote master playlist did not arrive in time.
    #[error("master playlist {manifest_id} unavailable after {wait_ms}ms")]
    PlaylistUnavailable {
        /// Manifest that was requested.
        manifest_id: String,
        /// Wait window in milliseconds.
        wait_ms: u64,
    },

    /// Node was built without a network capability.
    #[error("no video network configured")]
    MissingNetwork,

    /// Transcoder failed.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// Identifier, profile or signature error.
    #[error("types error: {0}")]
    Types(#[from] TypesError),
}

/// Result type for video operations.
pub type VideoResult<T> = Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VideoError::ManifestStreamCount(2);
        assert_eq!(
            err.to_string(),
            "manifest must contain exactly one stream, found 2"
        );

        let err = VideoError::PlaylistUnavailable {
            manifest_id: "abc".into(),
            wait_ms: 60_000,
        };
        assert!(err.to_string().contains("60000ms"));
    }

    #[test]
    fn test_error_conversion() {
        let err: VideoError = TypesError::InvalidSignature("short".into()).into();
        assert!(matches!(err, VideoError::Types(_)));
    }
}
