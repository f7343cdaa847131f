//! Error types shared by VTN type constructors and key handling.

use thiserror::Error;

/// Errors raised while constructing or validating core types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Node id is not a 68 character hex string.
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    /// Stream id could not be split into node, token and label.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    /// Manifest id could not be split into node and token.
    #[error("invalid manifest id: {0}")]
    InvalidManifestId(String),

    /// Profile name is not in the registry.
    #[error("unknown video profile: {0}")]
    UnknownProfile(String),

    /// No valid profile could be parsed from a transcoding option list.
    #[error("invalid transcoding options: {0}")]
    InvalidTranscodingOptions(String),

    /// Secret or public key material is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature bytes are malformed or recovery failed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Keystore file could not be used.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core type operations.
pub type TypesResult<T> = Result<T, TypesError>;
