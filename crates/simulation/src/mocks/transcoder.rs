//! Mock transcoder producing tagged copies of the input.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use vtn_types::VideoProfile;
use vtn_video::{Transcoder, VideoError, VideoResult};

/// Deterministic transcoder: each rendition is `<profile name>:<payload>`.
#[derive(Debug, Default)]
pub struct MockTranscoder {
    calls: AtomicUsize,
    fail: AtomicBool,
    skip_last: AtomicBool,
}

impl MockTranscoder {
    /// Create a working transcoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Omit the output for the last profile.
    pub fn set_skip_last(&self, skip: bool) {
        self.skip_last.store(skip, Ordering::SeqCst);
    }

    /// Number of transcode calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Expected rendition for `payload` under `profile`.
    pub fn rendition(profile: &VideoProfile, payload: &[u8]) -> Vec<u8> {
        let mut out = format!("{}:", profile.name).into_bytes();
        out.extend_from_slice(payload);
        out
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(&self, payload: Vec<u8>, profiles: &[VideoProfile]) -> VideoResult<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VideoError::Transcode("encoder crashed".into()));
        }

        let mut outputs: Vec<_> = profiles
            .iter()
            .map(|p| Self::rendition(p, &payload))
            .collect();
        if self.skip_last.load(Ordering::SeqCst) {
            outputs.pop();
        }
        Ok(outputs)
    }
}
