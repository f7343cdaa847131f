//! # VTN Video Data Plane
//!
//! Moves attested media segments across the peer network and keeps master
//! playlists in step with transcoding results.
//!
//! ## Architecture
//!
//! ```text
//! Broadcaster node                               Transcoder node
//! ────────────────                               ───────────────
//! Segment ─▶ SegmentAttestor ─▶ BroadcastRelay ─▶ SubscribeRelay ─▶ TranscodePipeline
//!                                                                      │
//! ManifestSync ◀──────────── TranscodeResponse ◀─── notify_broadcaster ┘
//! ```
//!
//! ## Components
//!
//! - [`SegmentAttestor`]: Signs `keccak256(stream ‖ seq ‖ keccak256(payload))`
//! - [`BroadcastRelay`]: Encodes signed segments and pushes them to subscribers
//! - [`SubscribeRelay`]: Decodes inbound segments into a [`SegmentSink`]
//! - [`HlsVideoStream`]: Ordered, bounded local segment buffer
//! - [`ManifestSync`]: Publishes playlists and folds in transcode responses
//! - [`TranscodePipeline`]: Source stream to per-profile result streams
//!
//! The transport is abstracted by [`VideoNetwork`] and the engine by
//! [`Transcoder`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attest;
pub mod broadcast;
pub mod error;
pub mod manifest;
pub mod network;
pub mod playlist;
pub mod stream;
pub mod subscribe;
pub mod transcode;
pub mod wire;

pub use attest::{recover_signer, verify_segment, SegmentAttestor};
pub use broadcast::{BroadcastRelay, BroadcastReport};
pub use error::{VideoError, VideoResult};
pub use manifest::{
    ManifestConfig, ManifestSync, ReconcileHandle, ReconcileReport, DEFAULT_MASTER_PLAYLIST_WAIT,
};
pub use network::{Broadcaster, StreamItem, Subscriber, TranscodeResponse, VideoNetwork};
pub use playlist::{HlsManifest, ManifestEntry, MasterPlaylist, SharedManifest, Variant};
pub use stream::{HlsVideoStream, SegmentSink, StreamConfig, DEFAULT_STREAM_CAPACITY};
pub use subscribe::{RelayHandle, RelayStats, SubscribeConfig, SubscribeRelay};
pub use transcode::{TranscodePipeline, TranscodeSession, Transcoder};
pub use wire::{decode_segment, encode_segment, SegmentEnvelope, SEGMENT_ENVELOPE_VERSION};
