//! Core types for VTN nodes
//!
//! Shared definitions used by the chain coordination layer, the video relay
//! and the node binary: stream/manifest identifiers, the transcoding profile
//! registry, media segments with their attestation hash, and the secp256k1
//! account used to sign segments.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod error;
pub mod ids;
pub mod profile;
pub mod segment;

pub use account::{recover_address, AccountSigner, Keystore, LocalAccount, SIGNATURE_LEN};
pub use error::{TypesError, TypesResult};
pub use ids::{ManifestId, NodeId, StreamId};
pub use profile::{BroadcastConfig, OptionFingerprint, VariantParams, VideoProfile, VIDEO_PROFILES};
pub use segment::{segment_hash, Segment, SignedSegment};

/// Ethereum-style 20-byte account address.
pub use sp_core::H160 as Address;
