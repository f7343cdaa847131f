//! In-memory video network shared by any number of simulated nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use vtn_types::{ManifestId, NodeId, StreamId};
use vtn_video::{
    Broadcaster, MasterPlaylist, StreamItem, Subscriber, TranscodeResponse, VideoError,
    VideoNetwork, VideoResult,
};

/// A transcode response observed on the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentResponse {
    /// Destination node.
    pub node: NodeId,
    /// Source stream the response refers to.
    pub stream: String,
    /// Result streams.
    pub response: TranscodeResponse,
}

/// Broadcast/subscribe channel for one stream.
pub struct MemoryChannel {
    subscribers: Mutex<Vec<mpsc::Sender<StreamItem>>>,
    broadcasts: AtomicU64,
    unsubscribes: AtomicU64,
    finished: AtomicBool,
    fail_broadcasts: Arc<AtomicBool>,
}

impl MemoryChannel {
    fn new(fail_broadcasts: Arc<AtomicBool>) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            broadcasts: AtomicU64::new(0),
            unsubscribes: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            fail_broadcasts,
        }
    }

    fn sinks(&self) -> Vec<mpsc::Sender<StreamItem>> {
        let mut subscribers = self.subscribers.lock().expect("channel lock poisoned");
        subscribers.retain(|s| !s.is_closed());
        subscribers.clone()
    }

    async fn deliver(&self, item: StreamItem) {
        for sink in self.sinks() {
            let _ = sink.send(item.clone()).await;
        }
    }

    /// Segments broadcast so far.
    pub fn broadcast_count(&self) -> u64 {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Unsubscribe calls so far.
    pub fn unsubscribe_count(&self) -> u64 {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Whether `finish` was called.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sinks().len()
    }

    /// Deliver raw bytes as if a peer broadcast them.
    pub async fn inject(&self, seq_no: u64, payload: Vec<u8>) {
        self.deliver(StreamItem::Data { seq_no, payload }).await;
    }
}

#[async_trait]
impl Broadcaster for MemoryChannel {
    async fn broadcast(&self, seq_no: u64, payload: Vec<u8>) -> VideoResult<()> {
        if self.fail_broadcasts.load(Ordering::SeqCst) {
            return Err(VideoError::Network("no peers reachable".into()));
        }
        self.deliver(StreamItem::Data { seq_no, payload }).await;
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self) -> VideoResult<()> {
        self.finished.store(true, Ordering::SeqCst);
        self.deliver(StreamItem::Eof).await;
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryChannel {
    async fn subscribe(&self, sink: mpsc::Sender<StreamItem>) -> VideoResult<()> {
        self.subscribers
            .lock()
            .expect("channel lock poisoned")
            .push(sink);
        Ok(())
    }

    async fn unsubscribe(&self) -> VideoResult<()> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .lock()
            .expect("channel lock poisoned")
            .clear();
        Ok(())
    }
}

#[derive(Default)]
struct FabricState {
    channels: HashMap<String, Arc<MemoryChannel>>,
    playlists: HashMap<String, MasterPlaylist>,
    responses: HashMap<String, Vec<mpsc::Sender<TranscodeResponse>>>,
    sent: Vec<SentResponse>,
}

/// Shared medium connecting simulated nodes.
#[derive(Clone)]
pub struct MemoryFabric {
    state: Arc<Mutex<FabricState>>,
    playlist_version: Arc<watch::Sender<u64>>,
    fail_broadcasts: Arc<AtomicBool>,
}

impl Default for MemoryFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFabric {
    /// Empty fabric.
    pub fn new() -> Self {
        let (playlist_version, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(FabricState::default())),
            playlist_version: Arc::new(playlist_version),
            fail_broadcasts: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FabricState> {
        self.state.lock().expect("fabric lock poisoned")
    }

    /// Attach a node.
    pub fn node(&self, node_id: NodeId) -> MemoryNetwork {
        MemoryNetwork {
            node_id,
            fabric: self.clone(),
        }
    }

    /// Channel for `stream`, if one exists.
    pub fn channel(&self, stream: &StreamId) -> Option<Arc<MemoryChannel>> {
        self.state().channels.get(&stream.to_string()).cloned()
    }

    fn channel_or_create(&self, stream: &StreamId) -> Arc<MemoryChannel> {
        let fail = Arc::clone(&self.fail_broadcasts);
        let mut state = self.state();
        Arc::clone(
            state
                .channels
                .entry(stream.to_string())
                .or_insert_with(|| Arc::new(MemoryChannel::new(fail))),
        )
    }

    /// Make every broadcast fail.
    pub fn set_fail_broadcasts(&self, fail: bool) {
        self.fail_broadcasts.store(fail, Ordering::SeqCst);
    }

    /// Published playlist for `manifest`.
    pub fn playlist(&self, manifest: &ManifestId) -> Option<MasterPlaylist> {
        self.state().playlists.get(&manifest.to_string()).cloned()
    }

    /// Transcode responses sent so far.
    pub fn sent_responses(&self) -> Vec<SentResponse> {
        self.state().sent.clone()
    }
}

/// One node's view of a [`MemoryFabric`].
#[derive(Clone)]
pub struct MemoryNetwork {
    node_id: NodeId,
    fabric: MemoryFabric,
}

impl MemoryNetwork {
    /// Node on its own private fabric.
    pub fn standalone(node_id: NodeId) -> Self {
        MemoryFabric::new().node(node_id)
    }

    /// Underlying fabric.
    pub fn fabric(&self) -> &MemoryFabric {
        &self.fabric
    }
}

#[async_trait]
impl VideoNetwork for MemoryNetwork {
    fn node_id(&self) -> NodeId {
        self.node_id.clone()
    }

    async fn broadcaster(&self, stream: &StreamId) -> VideoResult<Arc<dyn Broadcaster>> {
        Ok(self.fabric.channel_or_create(stream))
    }

    async fn subscriber(&self, stream: &StreamId) -> VideoResult<Arc<dyn Subscriber>> {
        Ok(self.fabric.channel_or_create(stream))
    }

    async fn existing_subscriber(&self, stream: &StreamId) -> Option<Arc<dyn Subscriber>> {
        self.fabric
            .channel(stream)
            .map(|channel| channel as Arc<dyn Subscriber>)
    }

    async fn update_master_playlist(
        &self,
        manifest: &ManifestId,
        playlist: Option<MasterPlaylist>,
    ) -> VideoResult<()> {
        {
            let mut state = self.fabric.state();
            match playlist {
                Some(playlist) => {
                    state.playlists.insert(manifest.to_string(), playlist);
                }
                None => {
                    state.playlists.remove(&manifest.to_string());
                }
            }
        }
        self.fabric.playlist_version.send_modify(|v| *v += 1);
        Ok(())
    }

    async fn master_playlist(
        &self,
        _node: &NodeId,
        manifest: &ManifestId,
    ) -> VideoResult<MasterPlaylist> {
        let mut version = self.fabric.playlist_version.subscribe();
        loop {
            if let Some(playlist) = self.fabric.playlist(manifest) {
                return Ok(playlist);
            }
            version
                .changed()
                .await
                .map_err(|_| VideoError::Network("fabric shut down".into()))?;
        }
    }

    async fn send_transcode_response(
        &self,
        node: &NodeId,
        stream: &StreamId,
        response: TranscodeResponse,
    ) -> VideoResult<()> {
        let sinks = {
            let mut state = self.fabric.state();
            state.sent.push(SentResponse {
                node: node.clone(),
                stream: stream.to_string(),
                response: response.clone(),
            });
            let sinks = state.responses.entry(stream.to_string()).or_default();
            sinks.retain(|s| !s.is_closed());
            sinks.clone()
        };

        for sink in sinks {
            let _ = sink.send(response.clone()).await;
        }
        Ok(())
    }

    async fn receive_transcode_responses(
        &self,
        stream: &StreamId,
        sink: mpsc::Sender<TranscodeResponse>,
    ) -> VideoResult<()> {
        self.fabric
            .state()
            .responses
            .entry(stream.to_string())
            .or_default()
            .push(sink);
        Ok(())
    }
}
