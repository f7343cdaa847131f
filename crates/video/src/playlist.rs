//! Manifest model: variants, master playlists and the local manifest that
//! owns the streams behind them.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use vtn_types::{ManifestId, VideoProfile};

use crate::error::{VideoError, VideoResult};
use crate::stream::HlsVideoStream;

/// One rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Media playlist URI, `<stream id>.m3u8`.
    pub uri: String,
    /// Bits per second.
    pub bandwidth: u64,
    /// `WIDTHxHEIGHT`.
    pub resolution: String,
    /// Profile the rendition was produced with.
    pub profile: String,
}

impl Variant {
    /// Variant for `stream` rendered with `profile`.
    ///
    /// The stream id is used verbatim as the URI stem.
    pub fn for_stream(stream: impl fmt::Display, profile: &VideoProfile) -> Self {
        let params = profile.variant_params();
        Self {
            uri: format!("{stream}.m3u8"),
            bandwidth: params.bandwidth,
            resolution: params.resolution,
            profile: profile.name.to_string(),
        }
    }
}

/// Top-level index of every rendition of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterPlaylist {
    /// Renditions in insertion order.
    pub variants: Vec<Variant>,
}

impl MasterPlaylist {
    /// Variant with the given URI.
    pub fn variant(&self, uri: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.uri == uri)
    }
}

/// A stream registered in a manifest and the variant describing it.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Local stream buffer.
    pub stream: Arc<HlsVideoStream>,
    /// Playlist entry.
    pub variant: Variant,
}

/// Local manifest: the source stream plus every reconciled rendition.
#[derive(Debug)]
pub struct HlsManifest {
    id: ManifestId,
    entries: Vec<ManifestEntry>,
}

/// Manifest shared between its owner and the reconciliation worker.
pub type SharedManifest = Arc<Mutex<HlsManifest>>;

impl HlsManifest {
    /// Empty manifest.
    pub fn new(id: ManifestId) -> Self {
        Self {
            id,
            entries: Vec::new(),
        }
    }

    /// Wrap for sharing.
    pub fn shared(self) -> SharedManifest {
        Arc::new(Mutex::new(self))
    }

    /// Manifest id.
    pub fn id(&self) -> &ManifestId {
        &self.id
    }

    /// Register a stream. Stream ids and URIs must be unique.
    pub fn add_stream(&mut self, stream: Arc<HlsVideoStream>, variant: Variant) -> VideoResult<()> {
        if self.entries.iter().any(|e| e.stream.id() == stream.id()) {
            return Err(VideoError::InvalidVariant(format!(
                "stream {} already in manifest",
                stream.id()
            )));
        }
        if self.entries.iter().any(|e| e.variant.uri == variant.uri) {
            return Err(VideoError::InvalidVariant(format!(
                "variant {} already in manifest",
                variant.uri
            )));
        }

        self.entries.push(ManifestEntry { stream, variant });
        Ok(())
    }

    /// All registered streams.
    pub fn streams(&self) -> Vec<Arc<HlsVideoStream>> {
        self.entries.iter().map(|e| Arc::clone(&e.stream)).collect()
    }

    /// Stream by id.
    pub fn stream(&self, id: &str) -> Option<Arc<HlsVideoStream>> {
        self.entries
            .iter()
            .find(|e| e.stream.id() == id)
            .map(|e| Arc::clone(&e.stream))
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no stream is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current master playlist.
    pub fn master_playlist(&self) -> MasterPlaylist {
        MasterPlaylist {
            variants: self.entries.iter().map(|e| e.variant.clone()).collect(),
        }
    }
}
