//! Node composition: wires the ledger, network, account and transcoder
//! capabilities into the chain services and data-plane relays.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sp_core::H160;
use tokio::sync::mpsc;
use tracing::{info, warn};
use vtn_chain::{
    ChainError, ChainResult, EventMonitor, JobCoordinator, JobForwarder, LedgerClient,
    NewJobEvent, RewardService, RoundsService, Subscription, TxWaiter,
};
use vtn_types::{
    AccountSigner, LocalAccount, ManifestId, NodeId, OptionFingerprint, StreamId, VideoProfile,
};
use vtn_video::{
    BroadcastRelay, HlsManifest, HlsVideoStream, ManifestSync, SegmentAttestor, SharedManifest,
    StreamConfig, SubscribeRelay, TranscodePipeline, TranscodeSession, Transcoder, Variant,
    VideoError, VideoNetwork,
};

use crate::config::NodeConfig;

struct ChainServices {
    monitor: EventMonitor,
    rounds: RoundsService,
    reward: RewardService,
}

/// Builder for [`VideoNode`].
pub struct NodeBuilder {
    config: NodeConfig,
    network: Option<Arc<dyn VideoNetwork>>,
    ledger: Option<Arc<dyn LedgerClient>>,
    account: Option<Arc<dyn AccountSigner>>,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl NodeBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            network: None,
            ledger: None,
            account: None,
            transcoder: None,
        }
    }

    /// Peer network. Required.
    pub fn network(mut self, network: Arc<dyn VideoNetwork>) -> Self {
        self.network = Some(network);
        self
    }

    /// Ledger access. Without it the node is data plane only.
    pub fn ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Signing account. A throwaway key is generated when unset.
    pub fn account(mut self, account: Arc<dyn AccountSigner>) -> Self {
        self.account = Some(account);
        self
    }

    /// Transcoding engine. Enables [`VideoNode::transcode_job`].
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn build(self) -> Result<VideoNode> {
        let network = self.network.ok_or(VideoError::MissingNetwork)?;
        let config = self.config;

        let account: Arc<dyn AccountSigner> = match self.account {
            Some(account) => account,
            None => {
                warn!("No account configured, using an ephemeral key");
                Arc::new(LocalAccount::generate())
            }
        };

        let broadcast = BroadcastRelay::new(network.clone(), SegmentAttestor::new(account.clone()));
        let subscribe = SubscribeRelay::new(network.clone(), config.subscribe_config()?);
        let manifests = ManifestSync::new(network.clone(), config.manifest_config());
        let jobs = JobCoordinator::new(self.ledger.clone(), config.job_config());

        let chain = self.ledger.map(|ledger| {
            let monitor = EventMonitor::new(ledger.clone(), config.monitor_config());
            let waiter = TxWaiter::new(ledger.clone(), config.tx_config());
            ChainServices {
                rounds: RoundsService::new(ledger.clone(), monitor.clone(), waiter.clone()),
                reward: RewardService::new(ledger, monitor.clone(), waiter),
                monitor,
            }
        });

        let pipeline = self.transcoder.map(|transcoder| {
            TranscodePipeline::new(
                network.clone(),
                transcoder,
                broadcast.clone(),
                subscribe.clone(),
                manifests.clone(),
            )
        });

        let node_id = network.node_id();
        info!(
            node_id = %node_id,
            address = %format!("{:#x}", account.address()),
            ledger = chain.is_some(),
            transcoder = pipeline.is_some(),
            "Node built"
        );

        Ok(VideoNode {
            node_id,
            account,
            broadcast,
            subscribe,
            manifests,
            jobs,
            chain,
            pipeline,
            stream_config: config.stream_config(),
        })
    }
}

/// A composed node.
pub struct VideoNode {
    node_id: NodeId,
    account: Arc<dyn AccountSigner>,
    broadcast: BroadcastRelay,
    subscribe: SubscribeRelay,
    manifests: ManifestSync,
    jobs: JobCoordinator,
    chain: Option<ChainServices>,
    pipeline: Option<TranscodePipeline>,
    stream_config: StreamConfig,
}

impl VideoNode {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn address(&self) -> H160 {
        self.account.address()
    }

    pub fn broadcast(&self) -> &BroadcastRelay {
        &self.broadcast
    }

    pub fn subscribe(&self) -> &SubscribeRelay {
        &self.subscribe
    }

    pub fn manifests(&self) -> &ManifestSync {
        &self.manifests
    }

    pub fn jobs(&self) -> &JobCoordinator {
        &self.jobs
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream_config
    }

    /// Whether both chain services are running.
    pub fn chain_services_running(&self) -> bool {
        self.chain
            .as_ref()
            .map_or(false, |c| c.rounds.is_running() && c.reward.is_running())
    }

    /// Start round initialization and reward claiming.
    pub async fn start_chain_services(&mut self) -> ChainResult<()> {
        let chain = self.chain.as_mut().ok_or(ChainError::NoLedgerClient)?;
        chain.rounds.start().await?;
        if let Err(e) = chain.reward.start().await {
            if let Err(rollback) = chain.rounds.stop() {
                warn!(error = %rollback, "Failed to stop rounds service after reward start failure");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop both chain services.
    pub fn stop_chain_services(&mut self) -> ChainResult<()> {
        let chain = self.chain.as_mut().ok_or(ChainError::NoLedgerClient)?;
        let rounds = chain.rounds.stop();
        let reward = chain.reward.stop();
        rounds.and(reward)
    }

    /// Forward `NewJob` events into a channel.
    pub async fn watch_jobs(
        &self,
        broadcaster: Option<H160>,
        capacity: usize,
    ) -> ChainResult<(Subscription, mpsc::Receiver<NewJobEvent>)> {
        let chain = self.chain.as_ref().ok_or(ChainError::NoLedgerClient)?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = chain
            .monitor
            .subscribe_new_job(broadcaster, JobForwarder::new(tx))
            .await?;
        Ok((subscription, rx))
    }

    /// New manifest holding one source stream rendered at `profile`.
    pub fn new_broadcast(&self, profile: &VideoProfile) -> Result<(SharedManifest, StreamId)> {
        let manifest_id = ManifestId::mint(&self.node_id);
        let source = StreamId::for_manifest(&manifest_id, "source");

        let mut manifest = HlsManifest::new(manifest_id);
        manifest.add_stream(
            Arc::new(HlsVideoStream::new(source.clone(), &self.stream_config)),
            Variant::for_stream(&source, profile),
        )?;
        Ok((manifest.shared(), source))
    }

    /// Start transcoding the stream named in a job.
    pub async fn transcode_job(&self, job: &NewJobEvent) -> Result<TranscodeSession> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| anyhow!("node has no transcoder"))?;

        let source: StreamId = job
            .stream_id
            .parse()
            .with_context(|| format!("job {} has an invalid stream id", job.job_id))?;
        let profiles = OptionFingerprint::from_hex(&job.transcoding_options)
            .and_then(|fingerprint| fingerprint.profiles())
            .with_context(|| format!("job {} has invalid transcoding options", job.job_id))?;

        info!(job_id = job.job_id, stream_id = %source, profiles = profiles.len(), "Transcoding job");
        Ok(pipeline.start(&source, &profiles).await?)
    }
}
