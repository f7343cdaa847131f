//! Master playlist publication and reconciliation.
//!
//! A broadcaster publishes a manifest holding exactly one source stream.
//! Transcoders later answer with a [`TranscodeResponse`] naming the result
//! streams they produced. Each response is folded into the manifest as new
//! variants and the playlist is pushed again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vtn_types::{ManifestId, NodeId, StreamId, VideoProfile};

use crate::error::{VideoError, VideoResult};
use crate::network::{TranscodeResponse, VideoNetwork};
use crate::playlist::{MasterPlaylist, SharedManifest, Variant};
use crate::stream::{HlsVideoStream, StreamConfig};

/// How long to wait for a remote master playlist.
pub const DEFAULT_MASTER_PLAYLIST_WAIT: Duration = Duration::from_secs(60);

/// Configuration for [`ManifestSync`].
#[derive(Debug, Clone)]
pub struct ManifestConfig {
    /// Wait window for remote playlists.
    pub playlist_wait: Duration,
    /// Capacity of the transcode response queue.
    pub response_queue: usize,
    /// Settings for streams created from responses.
    pub stream: StreamConfig,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            playlist_wait: DEFAULT_MASTER_PLAYLIST_WAIT,
            response_queue: 16,
            stream: StreamConfig::default(),
        }
    }
}

/// Outcome of folding one transcode response into a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Variants added to the manifest.
    pub added: Vec<Variant>,
    /// Entries skipped, as (stream id, reason).
    pub skipped: Vec<(String, String)>,
}

/// Handle to a manifest reconciliation worker.
#[derive(Debug)]
pub struct ReconcileHandle {
    manifest_id: ManifestId,
    worker: JoinHandle<u64>,
}

impl ReconcileHandle {
    /// Manifest being reconciled.
    pub fn manifest_id(&self) -> &ManifestId {
        &self.manifest_id
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stop reconciling.
    pub fn abort(&self) {
        self.worker.abort();
    }

    /// Wait for the worker; returns the number of responses handled.
    pub async fn join(self) -> VideoResult<u64> {
        self.worker
            .await
            .map_err(|e| VideoError::Network(format!("reconcile worker failed: {e}")))
    }
}

/// Keeps published master playlists in step with transcode responses.
#[derive(Clone)]
pub struct ManifestSync {
    network: Arc<dyn VideoNetwork>,
    config: ManifestConfig,
}

impl ManifestSync {
    /// Create a manifest sync.
    pub fn new(network: Arc<dyn VideoNetwork>, config: ManifestConfig) -> Self {
        Self { network, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ManifestConfig {
        &self.config
    }

    /// Publish `manifest` and start reconciling responses for its source.
    ///
    /// The manifest must hold exactly one stream.
    pub async fn publish_manifest(&self, manifest: SharedManifest) -> VideoResult<ReconcileHandle> {
        let (manifest_id, source, playlist) = {
            let guard = manifest.lock().await;
            let streams = guard.streams();
            if streams.len() != 1 {
                return Err(VideoError::ManifestStreamCount(streams.len()));
            }
            let source: StreamId = streams[0].id().parse()?;
            (guard.id().clone(), source, guard.master_playlist())
        };

        self.network
            .update_master_playlist(&manifest_id, Some(playlist))
            .await?;

        let (tx, responses) = mpsc::channel(self.config.response_queue.max(1));
        self.network
            .receive_transcode_responses(&source, tx)
            .await?;

        info!(manifest_id = %manifest_id, stream_id = %source, "Manifest published");
        let sync = self.clone();
        let worker = tokio::spawn(async move { sync.reconcile_loop(manifest, responses).await });

        Ok(ReconcileHandle {
            manifest_id,
            worker,
        })
    }

    async fn reconcile_loop(
        self,
        manifest: SharedManifest,
        mut responses: mpsc::Receiver<TranscodeResponse>,
    ) -> u64 {
        let mut handled = 0;
        while let Some(response) = responses.recv().await {
            let report = self.reconcile(&manifest, response).await;
            handled += 1;
            info!(
                added = report.added.len(),
                skipped = report.skipped.len(),
                "Transcode response reconciled"
            );
        }
        debug!("Transcode response queue closed");
        handled
    }

    /// Fold one response into `manifest` and republish its playlist.
    ///
    /// Bad entries are logged and skipped; the rest still apply.
    pub async fn reconcile(
        &self,
        manifest: &SharedManifest,
        response: TranscodeResponse,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let (manifest_id, playlist) = {
            let mut guard = manifest.lock().await;
            for (stream, profile_name) in response {
                let Some(profile) = VideoProfile::lookup(&profile_name) else {
                    warn!(stream_id = %stream, profile = %profile_name, "Unknown profile in transcode response");
                    report
                        .skipped
                        .push((stream, format!("unknown profile {profile_name}")));
                    continue;
                };

                if stream.is_empty() {
                    warn!(profile = %profile_name, "Empty stream id in transcode response");
                    report.skipped.push((stream, "empty stream id".to_string()));
                    continue;
                }

                let variant = Variant::for_stream(&stream, &profile);
                let local = Arc::new(HlsVideoStream::new(stream.as_str(), &self.config.stream));
                match guard.add_stream(local, variant.clone()) {
                    Ok(()) => report.added.push(variant),
                    Err(e) => {
                        warn!(stream_id = %stream, error = %e, "Failed to add variant");
                        report.skipped.push((stream, e.to_string()));
                    }
                }
            }
            (guard.id().clone(), guard.master_playlist())
        };

        if let Err(e) = self
            .network
            .update_master_playlist(&manifest_id, Some(playlist))
            .await
        {
            warn!(manifest_id = %manifest_id, error = %e, "Failed to republish master playlist");
        }

        report
    }

    /// Withdraw a published playlist.
    pub async fn unpublish(&self, manifest_id: &ManifestId) -> VideoResult<()> {
        self.network.update_master_playlist(manifest_id, None).await?;
        info!(manifest_id = %manifest_id, "Manifest withdrawn");
        Ok(())
    }

    /// Fetch a remote master playlist within the configured wait window.
    pub async fn fetch_master_playlist(
        &self,
        node: &NodeId,
        manifest_id: &ManifestId,
    ) -> VideoResult<MasterPlaylist> {
        let wait = self.config.playlist_wait;
        match tokio::time::timeout(wait, self.network.master_playlist(node, manifest_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(manifest_id = %manifest_id, "Master playlist not available in time");
                Err(VideoError::PlaylistUnavailable {
                    manifest_id: manifest_id.to_string(),
                    wait_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Tell the origin of `stream_id` which result streams now exist.
    ///
    /// Nothing is sent when this node is the origin.
    pub async fn notify_broadcaster(
        &self,
        origin: &NodeId,
        stream_id: &StreamId,
        results: TranscodeResponse,
    ) -> VideoResult<()> {
        if *origin == self.network.node_id() {
            debug!(stream_id = %stream_id, "Origin is this node, skipping transcode notification");
            return Ok(());
        }

        info!(stream_id = %stream_id, origin = %origin, results = results.len(), "Notifying broadcaster");
        self.network
            .send_transcode_response(origin, stream_id, results)
            .await
    }
}
