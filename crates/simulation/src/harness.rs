//! Pre-wired components over the mocks.

use std::sync::Arc;
use std::time::Duration;

use vtn_chain::{
    EventMonitor, JobConfig, JobCoordinator, LedgerClient, MonitorConfig, RewardService,
    RoundsService, TxWaiter, TxWaiterConfig,
};
use vtn_types::{LocalAccount, NodeId};
use vtn_video::{
    BroadcastRelay, ManifestConfig, ManifestSync, SegmentAttestor, SubscribeConfig,
    SubscribeRelay, TranscodePipeline, Transcoder,
};

use crate::mocks::{MemoryFabric, MemoryNetwork, MockLedger};

/// Chain services sharing one [`MockLedger`].
pub struct ChainHarness {
    /// Scripted ledger.
    pub ledger: Arc<MockLedger>,
    /// Monitor over the ledger.
    pub monitor: EventMonitor,
    /// Waiter over the ledger.
    pub waiter: TxWaiter,
}

impl ChainHarness {
    /// Harness with default timeouts.
    pub fn new(ledger: MockLedger) -> Self {
        Self::with_tx_timeout(ledger, vtn_chain::DEFAULT_TX_TIMEOUT)
    }

    /// Harness with a custom transaction timeout.
    pub fn with_tx_timeout(ledger: MockLedger, timeout: Duration) -> Self {
        let ledger = Arc::new(ledger);
        let client: Arc<dyn LedgerClient> = ledger.clone();
        Self {
            monitor: EventMonitor::new(Arc::clone(&client), MonitorConfig::default()),
            waiter: TxWaiter::new(client, TxWaiterConfig { timeout }),
            ledger,
        }
    }

    /// Ledger as a trait object.
    pub fn client(&self) -> Arc<dyn LedgerClient> {
        self.ledger.clone()
    }

    /// Stopped rounds service.
    pub fn rounds_service(&self) -> RoundsService {
        RoundsService::new(self.client(), self.monitor.clone(), self.waiter.clone())
    }

    /// Stopped reward service.
    pub fn reward_service(&self) -> RewardService {
        RewardService::new(self.client(), self.monitor.clone(), self.waiter.clone())
    }

    /// Job coordinator using the harness timeout.
    pub fn job_coordinator(&self) -> JobCoordinator {
        JobCoordinator::new(
            Some(self.client()),
            JobConfig {
                tx: self.waiter.config().clone(),
                ..JobConfig::default()
            },
        )
    }
}

/// Video relays for one node on a [`MemoryFabric`].
pub struct VideoHarness {
    /// Node identity.
    pub node_id: NodeId,
    /// Node's network view.
    pub network: Arc<MemoryNetwork>,
    /// Signing account.
    pub account: Arc<LocalAccount>,
    /// Outbound relay.
    pub broadcast: BroadcastRelay,
    /// Inbound relay.
    pub subscribe: SubscribeRelay,
    /// Playlist sync.
    pub manifests: ManifestSync,
}

impl VideoHarness {
    /// Attach a fresh node to `fabric`.
    pub fn new(fabric: &MemoryFabric) -> Self {
        Self::with_manifest_config(fabric, ManifestConfig::default())
    }

    /// Attach a fresh node with custom manifest settings.
    pub fn with_manifest_config(fabric: &MemoryFabric, config: ManifestConfig) -> Self {
        let node_id = NodeId::random();
        let network = Arc::new(fabric.node(node_id.clone()));
        let account = Arc::new(LocalAccount::generate());

        let attestor = SegmentAttestor::new(account.clone());
        Self {
            broadcast: BroadcastRelay::new(network.clone(), attestor),
            subscribe: SubscribeRelay::new(network.clone(), SubscribeConfig::default()),
            manifests: ManifestSync::new(network.clone(), config),
            node_id,
            network,
            account,
        }
    }

    /// Transcode pipeline for this node.
    pub fn pipeline(&self, transcoder: Arc<dyn Transcoder>) -> TranscodePipeline {
        TranscodePipeline::new(
            self.network.clone(),
            transcoder,
            self.broadcast.clone(),
            self.subscribe.clone(),
            self.manifests.clone(),
        )
    }
}
