//! Single-process devnet: a broadcaster and a transcoder sharing an
//! in-memory ledger and network.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use vtn_simulation::mocks::{MemoryFabric, MockLedger, MockTranscoder};
use vtn_types::{AccountSigner, LocalAccount, ManifestId, NodeId, Segment, StreamId, VideoProfile};
use vtn_video::{HlsVideoStream, MasterPlaylist};

use crate::config::NodeConfig;
use crate::node::{NodeBuilder, VideoNode};

/// Profile advertised for the source rendition.
const SOURCE_PROFILE: &str = "P720p30fps16x9";

const JOB_WAIT: Duration = Duration::from_secs(10);
const PLAYLIST_POLL: Duration = Duration::from_millis(50);

/// What a devnet run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnetReport {
    pub job_id: u64,
    pub segments_transcoded: u64,
    pub segments_viewed: u64,
    pub variants: usize,
    pub blocks: u64,
    pub round_initializations: usize,
    pub rewards: usize,
}

/// Run one broadcast through job creation, transcoding and playlist
/// reconciliation.
pub async fn run(config: &NodeConfig, account: Arc<LocalAccount>) -> Result<DevnetReport> {
    let devnet = &config.devnet;
    let broadcast_config = config.broadcast_config()?;
    let source_profile = VideoProfile::from_name(SOURCE_PROFILE)?;

    let fabric = MemoryFabric::new();
    let ledger = Arc::new(
        MockLedger::new()
            .with_account(account.address())
            .with_rounds(1, 0),
    );

    let mut origin = NodeBuilder::new(config.clone())
        .network(Arc::new(fabric.node(NodeId::random())))
        .ledger(ledger.clone())
        .account(account)
        .build()?;
    let worker = NodeBuilder::new(config.clone())
        .network(Arc::new(fabric.node(NodeId::random())))
        .ledger(ledger.clone())
        .account(Arc::new(LocalAccount::generate()))
        .transcoder(Arc::new(MockTranscoder::new()))
        .build()?;

    origin.start_chain_services().await?;
    let producer = spawn_block_producer(
        ledger.clone(),
        Duration::from_millis(devnet.block_interval_ms),
        devnet.blocks_per_round,
    );
    let (_job_watch, mut jobs) = worker.watch_jobs(None, 16).await?;

    let (manifest, source) = origin.new_broadcast(&source_profile)?;
    let manifest_id = manifest.lock().await.id().clone();
    let _reconcile = origin.manifests().publish_manifest(manifest).await?;

    let created = origin.jobs().create_job(&source, &broadcast_config).await?;
    info!(
        stream_id = %source,
        options = %created.request.transcoding_options,
        end_block = created.request.end_block,
        "Job submitted"
    );

    let job = tokio::time::timeout(JOB_WAIT, jobs.recv())
        .await
        .context("no job event observed")?
        .ok_or_else(|| anyhow!("job watch closed"))?;
    let session = worker.transcode_job(&job).await?;
    let expected_variants = 1 + session.results.len();

    // The origin watches one rendition the way a viewer would.
    let rendition_id: StreamId = session
        .results
        .keys()
        .next()
        .ok_or_else(|| anyhow!("transcoder produced no result streams"))?
        .parse()?;
    let rendition = Arc::new(HlsVideoStream::new(rendition_id.clone(), origin.stream_config()));
    let viewer = origin
        .subscribe()
        .subscribe(&rendition_id, rendition.clone())
        .await?;

    let segment_duration = Duration::from_millis(devnet.segment_duration_ms);
    for seq_no in 0..devnet.segments {
        let segment = Segment::new(
            seq_no,
            format!("{source}_{seq_no}.ts"),
            synthetic_payload(seq_no),
            segment_duration,
        );
        origin.broadcast().broadcast(&source, segment).await?;
    }
    origin.broadcast().finish(&source).await?;

    let stats = session.handle.join().await?;
    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        "Source stream transcoded"
    );

    let viewed = viewer.join().await?;
    info!(
        stream_id = %rendition_id,
        segments = rendition.len(),
        ended = rendition.is_ended(),
        "Rendition received"
    );

    let playlist =
        wait_for_variants(&worker, origin.node_id(), &manifest_id, expected_variants).await?;
    for variant in &playlist.variants {
        info!(
            uri = %variant.uri,
            profile = %variant.profile,
            bandwidth = variant.bandwidth,
            resolution = %variant.resolution,
            "Playlist variant"
        );
    }

    info!(running = origin.chain_services_running(), "Stopping chain services");
    origin.stop_chain_services()?;
    producer.abort();

    Ok(DevnetReport {
        job_id: job.job_id,
        segments_transcoded: stats.accepted,
        segments_viewed: viewed.accepted,
        variants: playlist.variants.len(),
        blocks: ledger.current_block(),
        round_initializations: ledger.initialize_count(),
        rewards: ledger.reward_count(),
    })
}

fn spawn_block_producer(
    ledger: Arc<MockLedger>,
    interval: Duration,
    blocks_per_round: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let block = ledger.emit_header().await;
            if block % blocks_per_round == 0 {
                let round = ledger.advance_round().await;
                debug!(block, round, "Round advanced");
            }
        }
    })
}

async fn wait_for_variants(
    node: &VideoNode,
    origin: &NodeId,
    manifest_id: &ManifestId,
    expected: usize,
) -> Result<MasterPlaylist> {
    let deadline = Instant::now() + node.manifests().config().playlist_wait;
    loop {
        let playlist = node
            .manifests()
            .fetch_master_playlist(origin, manifest_id)
            .await?;
        if playlist.variants.len() >= expected || Instant::now() >= deadline {
            return Ok(playlist);
        }
        tokio::time::sleep(PLAYLIST_POLL).await;
    }
}

fn synthetic_payload(seq_no: u64) -> Vec<u8> {
    let mut payload = b"devnet-segment-".to_vec();
    payload.extend_from_slice(&seq_no.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_devnet_run() {
        let mut config = NodeConfig::default();
        config.devnet.block_interval_ms = 5;
        config.devnet.blocks_per_round = 2;
        config.devnet.segments = 3;

        let report = run(&config, Arc::new(LocalAccount::generate()))
            .await
            .unwrap();

        assert_eq!(report.job_id, 1);
        assert_eq!(report.segments_transcoded, 3);
        assert_eq!(report.segments_viewed, 3);
        assert_eq!(report.variants, 3);
        assert!(report.blocks > 100);
    }
}
