//! Local ordered segment buffer for one stream.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;
use vtn_types::Segment;

use crate::error::{VideoError, VideoResult};

/// Default number of segments kept per stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 500;

/// Configuration for local streams.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Segments kept before the oldest is evicted.
    pub capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

/// Destination for segments decoded off the network.
#[async_trait]
pub trait SegmentSink: Send + Sync + 'static {
    /// Accept one segment.
    async fn accept(&self, segment: Segment) -> VideoResult<()>;

    /// The source stream ended.
    async fn end(&self);
}

#[derive(Debug, Default)]
struct StreamState {
    segments: BTreeMap<u64, Segment>,
    /// Highest sequence number evicted so far.
    evicted_through: Option<u64>,
    ended: bool,
}

impl StreamState {
    /// Whether `seq_no` falls below what a full buffer retains.
    fn is_stale(&self, seq_no: u64, capacity: usize) -> bool {
        if self.evicted_through.is_some_and(|evicted| seq_no <= evicted) {
            return true;
        }
        self.segments.len() >= capacity
            && self
                .segments
                .first_key_value()
                .is_some_and(|(oldest, _)| seq_no < *oldest)
    }
}

/// Segments of one stream ordered by sequence number.
///
/// Bounded: once `capacity` is exceeded the lowest sequence numbers are
/// evicted, and segments older than the retained window are rejected.
/// After [`end`](Self::end) every insert is rejected.
#[derive(Debug)]
pub struct HlsVideoStream {
    id: String,
    capacity: usize,
    state: Mutex<StreamState>,
    ended_tx: watch::Sender<bool>,
}

impl HlsVideoStream {
    /// Create an empty stream keyed by its network stream id.
    pub fn new(id: impl Into<String>, config: &StreamConfig) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            id: id.into(),
            capacity: config.capacity.max(1),
            state: Mutex::new(StreamState::default()),
            ended_tx,
        }
    }

    /// Stream id as carried on the network.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Insert a segment in sequence order.
    pub fn insert(&self, segment: Segment) -> VideoResult<()> {
        let mut state = self.state.lock().expect("stream lock poisoned");
        if state.ended {
            return Err(VideoError::StreamEnded(self.id.clone()));
        }
        if state.segments.contains_key(&segment.seq_no) {
            return Err(VideoError::DuplicateSegment {
                seq_no: segment.seq_no,
            });
        }
        if state.is_stale(segment.seq_no, self.capacity) {
            return Err(VideoError::StaleSegment {
                seq_no: segment.seq_no,
            });
        }

        state.segments.insert(segment.seq_no, segment);
        while state.segments.len() > self.capacity {
            if let Some((evicted, _)) = state.segments.pop_first() {
                state.evicted_through = Some(evicted);
                debug!(stream_id = %self.id, seq_no = evicted, "Evicted segment");
            }
        }
        Ok(())
    }

    /// Mark the stream ended. Idempotent.
    pub fn end(&self) {
        let mut state = self.state.lock().expect("stream lock poisoned");
        if !state.ended {
            state.ended = true;
            self.ended_tx.send_replace(true);
        }
    }

    /// Whether the stream has ended.
    pub fn is_ended(&self) -> bool {
        self.state.lock().expect("stream lock poisoned").ended
    }

    /// Wait until the stream ends.
    pub async fn wait_ended(&self) {
        let mut rx = self.ended_tx.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    /// Segment by sequence number.
    pub fn segment(&self, seq_no: u64) -> Option<Segment> {
        self.state
            .lock()
            .expect("stream lock poisoned")
            .segments
            .get(&seq_no)
            .cloned()
    }

    /// All buffered segments in order.
    pub fn segments(&self) -> Vec<Segment> {
        self.state
            .lock()
            .expect("stream lock poisoned")
            .segments
            .values()
            .cloned()
            .collect()
    }

    /// Highest buffered sequence number.
    pub fn latest_seq(&self) -> Option<u64> {
        self.state
            .lock()
            .expect("stream lock poisoned")
            .segments
            .keys()
            .next_back()
            .copied()
    }

    /// Number of buffered segments.
    pub fn len(&self) -> usize {
        self.state.lock().expect("stream lock poisoned").segments.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SegmentSink for HlsVideoStream {
    async fn accept(&self, segment: Segment) -> VideoResult<()> {
        self.insert(segment)
    }

    async fn end(&self) {
        HlsVideoStream::end(self);
    }
}
