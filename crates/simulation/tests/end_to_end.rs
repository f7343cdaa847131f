//! Broadcaster, transcoder and viewer on one fabric, driven by a job event.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use vtn_chain::{JobForwarder, NewJobEvent};
use vtn_simulation::mocks::{MemoryFabric, MockLedger, MockTranscoder};
use vtn_simulation::{eventually, ChainHarness, VideoHarness};
use vtn_types::{
    BroadcastConfig, ManifestId, OptionFingerprint, Segment, StreamId, VideoProfile,
};
use vtn_video::{
    HlsManifest, HlsVideoStream, RelayHandle, SharedManifest, StreamConfig, Variant, VideoError,
};

const WAIT: Duration = Duration::from_secs(5);

fn segment(seq_no: u64) -> Segment {
    Segment::new(
        seq_no,
        format!("source_{seq_no}.ts"),
        format!("frame-{seq_no}").into_bytes(),
        Duration::from_secs(2),
    )
}

fn source_manifest(origin: &VideoHarness) -> (SharedManifest, ManifestId, StreamId) {
    let manifest_id = ManifestId::mint(&origin.node_id);
    let source = StreamId::for_manifest(&manifest_id, "source");
    let profile = VideoProfile::from_name("P720p30fps16x9").unwrap();

    let mut manifest = HlsManifest::new(manifest_id.clone());
    manifest
        .add_stream(
            Arc::new(HlsVideoStream::new(source.clone(), &StreamConfig::default())),
            Variant::for_stream(&source, &profile),
        )
        .unwrap();
    (manifest.shared(), manifest_id, source)
}

/// Subscribe `viewer` to every result stream of a session.
async fn watch_results(
    viewer: &VideoHarness,
    results: &BTreeMap<String, String>,
) -> Vec<(String, Arc<HlsVideoStream>, RelayHandle)> {
    let mut watched = Vec::new();
    for (id, profile) in results {
        let stream_id: StreamId = id.parse().unwrap();
        let local = Arc::new(HlsVideoStream::new(stream_id.clone(), &StreamConfig::default()));
        let handle = viewer
            .subscribe
            .subscribe(&stream_id, local.clone())
            .await
            .unwrap();
        watched.push((profile.clone(), local, handle));
    }
    watched
}

#[tokio::test]
async fn test_job_to_playlist_flow() {
    let fabric = MemoryFabric::new();
    let origin = VideoHarness::new(&fabric);
    let worker = VideoHarness::new(&fabric);
    let viewer = VideoHarness::new(&fabric);
    let transcoder = Arc::new(MockTranscoder::new());

    // Transcoder watches for jobs.
    let chain = ChainHarness::new(MockLedger::new());
    let (tx, mut jobs) = mpsc::channel::<NewJobEvent>(4);
    let _watch = chain
        .monitor
        .subscribe_new_job(None, JobForwarder::new(tx))
        .await
        .unwrap();

    // Broadcaster publishes and creates the job.
    let (manifest, manifest_id, source) = source_manifest(&origin);
    let _reconcile = origin
        .manifests
        .publish_manifest(manifest.clone())
        .await
        .unwrap();
    let broadcast = BroadcastConfig::from_options(10, "P240p30fps16x9,P360p30fps16x9").unwrap();
    chain
        .job_coordinator()
        .create_job(&source, &broadcast)
        .await
        .unwrap();

    // Transcoder picks up the job.
    let job = tokio::time::timeout(WAIT, jobs.recv()).await.unwrap().unwrap();
    let job_stream: StreamId = job.stream_id.parse().unwrap();
    let profiles = OptionFingerprint::from_hex(&job.transcoding_options)
        .unwrap()
        .profiles()
        .unwrap();
    assert_eq!(job_stream, source);
    assert_eq!(profiles.len(), 2);

    let session = worker
        .pipeline(transcoder.clone())
        .start(&job_stream, &profiles)
        .await
        .unwrap();
    assert_eq!(session.results.len(), 2);
    let watched = watch_results(&viewer, &session.results).await;

    // Origin receives the response and lists the renditions.
    assert!(
        eventually(WAIT, || fabric
            .playlist(&manifest_id)
            .map_or(false, |p| p.variants.len() == 3))
        .await
    );

    // Media flows through to the viewer.
    let report = origin
        .broadcast
        .broadcast_all(&source, (0..3).map(segment))
        .await;
    assert_eq!(report.published, 3);
    origin.broadcast.finish(&source).await.unwrap();

    let stats = session.handle.join().await.unwrap();
    assert_eq!(stats.accepted, 3);
    assert!(stats.finished);
    assert_eq!(transcoder.call_count(), 3);

    for (profile, local, handle) in watched {
        let rendition = handle.join().await.unwrap();
        assert_eq!(rendition.accepted, 3);
        assert!(rendition.finished);
        assert!(local.is_ended());

        let profile = VideoProfile::from_name(&profile).unwrap();
        let first = local.segment(0).unwrap();
        assert_eq!(first.data, MockTranscoder::rendition(&profile, b"frame-0"));
        assert_eq!(first.name, format!("{}_0.ts", local.id()));
    }
}

#[tokio::test]
async fn test_transcoder_failure_drops_segments() {
    let fabric = MemoryFabric::new();
    let origin = VideoHarness::new(&fabric);
    let worker = VideoHarness::new(&fabric);
    let transcoder = Arc::new(MockTranscoder::new());
    transcoder.set_fail(true);

    let (_, _, source) = source_manifest(&origin);
    let profile = VideoProfile::from_name("P240p30fps16x9").unwrap();
    let session = worker
        .pipeline(transcoder.clone())
        .start(&source, &[profile])
        .await
        .unwrap();

    origin
        .broadcast
        .broadcast_all(&source, (0..2).map(segment))
        .await;
    origin.broadcast.finish(&source).await.unwrap();

    let stats = session.handle.join().await.unwrap();
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.dropped, 2);
    assert!(stats.finished);

    let result: StreamId = session.results.keys().next().unwrap().parse().unwrap();
    let channel = fabric.channel(&result).unwrap();
    assert_eq!(channel.broadcast_count(), 0);
    assert!(channel.is_finished());
}

#[tokio::test]
async fn test_missing_rendition_is_skipped() {
    let fabric = MemoryFabric::new();
    let origin = VideoHarness::new(&fabric);
    let worker = VideoHarness::new(&fabric);
    let transcoder = Arc::new(MockTranscoder::new());
    transcoder.set_skip_last(true);

    let (_, _, source) = source_manifest(&origin);
    let profiles = [
        VideoProfile::from_name("P240p30fps16x9").unwrap(),
        VideoProfile::from_name("P144p30fps16x9").unwrap(),
    ];
    let session = worker
        .pipeline(transcoder)
        .start(&source, &profiles)
        .await
        .unwrap();

    origin.broadcast.broadcast(&source, segment(0)).await.unwrap();
    origin.broadcast.finish(&source).await.unwrap();
    session.handle.join().await.unwrap();

    let counts: BTreeMap<String, u64> = session
        .results
        .iter()
        .map(|(id, profile)| {
            let stream: StreamId = id.parse().unwrap();
            (profile.clone(), fabric.channel(&stream).unwrap().broadcast_count())
        })
        .collect();
    assert_eq!(counts["P240p30fps16x9"], 1);
    assert_eq!(counts["P144p30fps16x9"], 0);
}

#[tokio::test]
async fn test_pipeline_requires_profiles() {
    let fabric = MemoryFabric::new();
    let worker = VideoHarness::new(&fabric);
    let source = StreamId::mint(&worker.node_id, "source");

    let err = worker
        .pipeline(Arc::new(MockTranscoder::new()))
        .start(&source, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, VideoError::Transcode(_)));
}
