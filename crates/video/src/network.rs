//! Network capability consumed by the relays.
//!
//! The peer-to-peer substrate lives elsewhere. It only has to hand out a
//! broadcaster and subscriber per stream, store master playlists keyed by
//! manifest, and carry transcode responses back to an origin node.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vtn_types::{ManifestId, NodeId, StreamId};

use crate::error::VideoResult;
use crate::playlist::MasterPlaylist;

/// Item delivered to a stream subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Encoded segment envelope.
    Data {
        /// Sequence number announced by the broadcaster.
        seq_no: u64,
        /// Envelope bytes.
        payload: Vec<u8>,
    },
    /// Broadcaster finished the stream.
    Eof,
}

/// Result stream id (string form) to profile name.
pub type TranscodeResponse = BTreeMap<String, String>;

/// Outbound side of a stream.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Push one encoded segment to every subscriber.
    async fn broadcast(&self, seq_no: u64, payload: Vec<u8>) -> VideoResult<()>;

    /// Signal end of stream.
    async fn finish(&self) -> VideoResult<()>;
}

/// Inbound side of a stream.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Start delivering items into `sink`.
    async fn subscribe(&self, sink: mpsc::Sender<StreamItem>) -> VideoResult<()>;

    /// Stop delivering.
    async fn unsubscribe(&self) -> VideoResult<()>;
}

/// Peer-to-peer video fabric.
#[async_trait]
pub trait VideoNetwork: Send + Sync {
    /// Identity of this node.
    fn node_id(&self) -> NodeId;

    /// Broadcaster for `stream`, created on first use.
    async fn broadcaster(&self, stream: &StreamId) -> VideoResult<Arc<dyn Broadcaster>>;

    /// Subscriber for `stream`, created on first use.
    async fn subscriber(&self, stream: &StreamId) -> VideoResult<Arc<dyn Subscriber>>;

    /// Existing subscriber for `stream`, if any.
    async fn existing_subscriber(&self, stream: &StreamId) -> Option<Arc<dyn Subscriber>>;

    /// Publish or, with `None`, withdraw a master playlist.
    async fn update_master_playlist(
        &self,
        manifest: &ManifestId,
        playlist: Option<MasterPlaylist>,
    ) -> VideoResult<()>;

    /// Fetch a master playlist from `node`. Resolves once it is available.
    async fn master_playlist(
        &self,
        node: &NodeId,
        manifest: &ManifestId,
    ) -> VideoResult<MasterPlaylist>;

    /// Send transcode results for `stream` to its origin `node`.
    async fn send_transcode_response(
        &self,
        node: &NodeId,
        stream: &StreamId,
        response: TranscodeResponse,
    ) -> VideoResult<()>;

    /// Deliver transcode responses addressed to `stream` into `sink`.
    async fn receive_transcode_responses(
        &self,
        stream: &StreamId,
        sink: mpsc::Sender<TranscodeResponse>,
    ) -> VideoResult<()>;
}
