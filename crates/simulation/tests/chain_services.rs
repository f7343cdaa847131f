//! Chain services driven by the mock ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sp_core::{H160, H256};
use tokio::sync::mpsc;
use vtn_chain::{
    ChainError, ChainResult, ContractName, EventHandler, Header, JobForwarder, LedgerClient,
    NewJobEvent, DEFAULT_JOB_LENGTH,
};
use vtn_simulation::mocks::{MockLedger, SubmittedTx, TxBehavior};
use vtn_simulation::{eventually, settle, ChainHarness};
use vtn_types::{BroadcastConfig, NodeId, StreamId};

const WAIT: Duration = Duration::from_secs(5);

/// Counts headers and fails on a chosen block.
#[derive(Clone)]
struct CountingHandler {
    seen: Arc<AtomicUsize>,
    fail_at: Option<u64>,
}

impl CountingHandler {
    fn new(fail_at: Option<u64>) -> (Self, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        (
            Self {
                seen: Arc::clone(&seen),
                fail_at,
            },
            seen,
        )
    }
}

#[async_trait]
impl EventHandler<Header> for CountingHandler {
    async fn handle(&mut self, header: Header) -> ChainResult<()> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if Some(header.number) == self.fail_at {
            return Err(ChainError::Decode("bad header".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TxWaiter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tx_waiter_returns_successful_receipt() {
    let harness = ChainHarness::new(MockLedger::new().with_rounds(2, 1));
    let tx = harness.ledger.initialize_round().await.unwrap();

    let receipt = harness.waiter.confirm(tx).await.unwrap();
    assert_eq!(receipt.tx, tx);
    assert!(receipt.succeeded());
}

#[tokio::test]
async fn test_tx_waiter_reports_revert() {
    let harness = ChainHarness::new(MockLedger::new().with_tx_behavior(TxBehavior::Revert));
    let tx = harness.ledger.reward().await.unwrap();

    let err = harness.waiter.confirm(tx).await.unwrap_err();
    assert!(matches!(err, ChainError::TxReverted { tx: t } if t == tx));
}

#[tokio::test(start_paused = true)]
async fn test_tx_waiter_times_out_pending_tx() {
    let harness = ChainHarness::with_tx_timeout(
        MockLedger::new().with_tx_behavior(TxBehavior::Pending),
        Duration::from_secs(30),
    );
    let tx = harness.ledger.reward().await.unwrap();

    let err = harness.waiter.confirm(tx).await.unwrap_err();
    assert!(matches!(err, ChainError::TxTimeout { timeout_ms: 30_000, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_tx_waiter_unknown_tx_is_ledger_error() {
    let harness = ChainHarness::new(MockLedger::new());
    let err = harness
        .waiter
        .confirm(H256::repeat_byte(0xee))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Ledger(_)));
}

// ---------------------------------------------------------------------------
// EventMonitor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_monitor_requires_contract_addresses() {
    let harness = ChainHarness::new(MockLedger::new().without_contract(ContractName::JobsManager));
    let (tx, _jobs) = mpsc::channel(1);

    let err = harness
        .monitor
        .subscribe_new_job(None, JobForwarder::new(tx))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::MissingContractAddress(ContractName::JobsManager)
    ));
}

#[tokio::test]
async fn test_monitor_delivers_headers_in_order() {
    let harness = ChainHarness::new(MockLedger::new());
    let (handler, seen) = CountingHandler::new(None);
    let subscription = harness
        .monitor
        .subscribe_new_blocks(handler)
        .await
        .unwrap();
    assert_eq!(subscription.kind(), "new_blocks");

    for _ in 0..3 {
        harness.ledger.emit_header().await;
    }

    assert!(eventually(WAIT, || seen.load(Ordering::SeqCst) == 3).await);
    assert!(!subscription.is_finished());
}

#[tokio::test]
async fn test_monitor_stops_after_handler_error() {
    let harness = ChainHarness::new(MockLedger::new());
    let (handler, seen) = CountingHandler::new(Some(102));
    let subscription = harness
        .monitor
        .subscribe_new_blocks(handler)
        .await
        .unwrap();

    harness.ledger.emit_header().await;
    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || subscription.is_finished()).await);

    harness.ledger.emit_header().await;
    settle().await;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(harness.ledger.head_subscriber_count(), 0);
}

#[tokio::test]
async fn test_monitor_stops_on_upstream_failure() {
    let harness = ChainHarness::new(MockLedger::new());
    let (handler, _) = CountingHandler::new(None);
    let subscription = harness
        .monitor
        .subscribe_new_blocks(handler)
        .await
        .unwrap();

    harness.ledger.fail_subscriptions("websocket closed");
    assert!(eventually(WAIT, || subscription.is_finished()).await);
}

#[tokio::test]
async fn test_monitor_close_and_drop_end_watch() {
    let harness = ChainHarness::new(MockLedger::new());

    let (handler, seen) = CountingHandler::new(None);
    let mut closed = harness
        .monitor
        .subscribe_new_blocks(handler)
        .await
        .unwrap();
    closed.close();
    assert!(eventually(WAIT, || closed.is_finished()).await);

    let (handler, _) = CountingHandler::new(None);
    let dropped = harness
        .monitor
        .subscribe_new_blocks(handler)
        .await
        .unwrap();
    drop(dropped);
    assert!(eventually(WAIT, || harness.ledger.head_subscriber_count() == 0).await);

    harness.ledger.emit_header().await;
    settle().await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// RoundsService
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rounds_noop_when_initialized() {
    let harness = ChainHarness::new(MockLedger::new().with_rounds(5, 5));
    let mut rounds = harness.rounds_service();
    rounds.start().await.unwrap();

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.round_reads() >= 1).await);
    settle().await;

    assert_eq!(harness.ledger.initialize_count(), 0);
    rounds.stop().unwrap();
}

#[tokio::test]
async fn test_rounds_initializes_lagging_round_once() {
    let harness = ChainHarness::new(MockLedger::new().with_rounds(6, 5));
    let mut rounds = harness.rounds_service();
    rounds.start().await.unwrap();

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.last_initialized() == 6).await);

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.round_reads() >= 2).await);
    settle().await;

    assert_eq!(
        harness.ledger.submitted(),
        vec![SubmittedTx::InitializeRound { round: 6 }]
    );
    assert!(rounds.is_running());
}

#[tokio::test]
async fn test_rounds_start_stop_lifecycle() {
    let harness = ChainHarness::new(MockLedger::new());
    let mut rounds = harness.rounds_service();
    assert!(!rounds.is_running());

    rounds.start().await.unwrap();
    assert!(matches!(
        rounds.start().await,
        Err(ChainError::AlreadyStarted("rounds service"))
    ));

    rounds.stop().unwrap();
    assert!(matches!(
        rounds.stop(),
        Err(ChainError::AlreadyStopped("rounds service"))
    ));

    rounds.start().await.unwrap();
    assert!(rounds.is_running());
}

#[tokio::test]
async fn test_rounds_retries_after_failed_read() {
    let harness = ChainHarness::new(MockLedger::new().with_rounds(3, 2));
    harness.ledger.set_fail_reads(true);

    let mut rounds = harness.rounds_service();
    rounds.start().await.unwrap();

    harness.ledger.emit_header().await;
    settle().await;
    assert_eq!(harness.ledger.initialize_count(), 0);
    assert!(rounds.is_running());

    harness.ledger.set_fail_reads(false);
    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.initialize_count() == 1).await);
}

#[tokio::test]
async fn test_rounds_survives_reverted_initialization() {
    let harness = ChainHarness::new(
        MockLedger::new()
            .with_rounds(3, 2)
            .with_tx_behavior(TxBehavior::Revert),
    );
    let mut rounds = harness.rounds_service();
    rounds.start().await.unwrap();

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.initialize_count() == 1).await);
    settle().await;
    assert!(rounds.is_running());
    assert_eq!(harness.ledger.last_initialized(), 2);

    harness.ledger.set_tx_behavior(TxBehavior::Success);
    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.last_initialized() == 3).await);

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.round_reads() >= 3).await);
    settle().await;
    assert_eq!(harness.ledger.initialize_count(), 2);
    assert!(rounds.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_rounds_survives_initialization_timeout() {
    let harness = ChainHarness::with_tx_timeout(
        MockLedger::new()
            .with_rounds(3, 2)
            .with_tx_behavior(TxBehavior::Pending),
        Duration::from_secs(1),
    );
    let mut rounds = harness.rounds_service();
    rounds.start().await.unwrap();

    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.initialize_count() == 1).await);

    harness.ledger.set_tx_behavior(TxBehavior::Success);
    harness.ledger.emit_header().await;
    assert!(eventually(WAIT, || harness.ledger.last_initialized() == 3).await);
    assert_eq!(harness.ledger.initialize_count(), 2);
    assert!(rounds.is_running());
}

#[tokio::test]
async fn test_rounds_direct_try_initialize() {
    let harness = ChainHarness::new(MockLedger::new().with_rounds(4, 3));
    let rounds = harness.rounds_service();

    let receipt = rounds.try_initialize_round().await.unwrap();
    assert!(receipt.is_some());
    assert!(rounds.try_initialize_round().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// RewardService
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reward_claimed_each_round_when_active() {
    let harness = ChainHarness::new(MockLedger::new());
    let mut reward = harness.reward_service();
    reward.start().await.unwrap();

    let round = harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 1).await);
    assert_eq!(harness.ledger.submitted(), vec![SubmittedTx::Reward { round }]);

    harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 2).await);
}

#[tokio::test]
async fn test_reward_skipped_when_inactive() {
    let harness = ChainHarness::new(MockLedger::new().with_active_transcoder(false));
    let mut reward = harness.reward_service();
    reward.start().await.unwrap();

    harness.ledger.advance_round().await;
    settle().await;
    assert_eq!(harness.ledger.reward_count(), 0);
    assert!(reward.is_running());

    harness.ledger.set_active_transcoder(true);
    harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 1).await);
}

#[tokio::test]
async fn test_reward_direct_claim_inactive() {
    let harness = ChainHarness::new(MockLedger::new().with_active_transcoder(false));
    let reward = harness.reward_service();

    let err = reward.try_reward(7).await.unwrap_err();
    assert!(matches!(err, ChainError::InactiveTranscoder { round: 7 }));
}

#[tokio::test]
async fn test_reward_lifecycle_errors() {
    let harness = ChainHarness::new(MockLedger::new());
    let mut reward = harness.reward_service();

    assert!(matches!(
        reward.stop(),
        Err(ChainError::AlreadyStopped("reward service"))
    ));
    reward.start().await.unwrap();
    assert!(matches!(
        reward.start().await,
        Err(ChainError::AlreadyStarted("reward service"))
    ));

    reward.stop().unwrap();
    assert!(!reward.is_running());
    assert!(matches!(
        reward.stop(),
        Err(ChainError::AlreadyStopped("reward service"))
    ));

    reward.start().await.unwrap();
    assert!(reward.is_running());
}

#[tokio::test]
async fn test_reward_survives_reverted_claim() {
    let harness = ChainHarness::new(MockLedger::new().with_tx_behavior(TxBehavior::Revert));
    let mut reward = harness.reward_service();
    reward.start().await.unwrap();

    harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 1).await);
    settle().await;
    assert!(reward.is_running());

    harness.ledger.set_tx_behavior(TxBehavior::Success);
    let round = harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 2).await);
    assert_eq!(
        harness.ledger.submitted().last(),
        Some(&SubmittedTx::Reward { round })
    );
    assert!(reward.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_reward_survives_claim_timeout() {
    let harness = ChainHarness::with_tx_timeout(
        MockLedger::new().with_tx_behavior(TxBehavior::Pending),
        Duration::from_secs(1),
    );
    let mut reward = harness.reward_service();
    reward.start().await.unwrap();

    harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 1).await);

    harness.ledger.set_tx_behavior(TxBehavior::Success);
    harness.ledger.advance_round().await;
    assert!(eventually(WAIT, || harness.ledger.reward_count() == 2).await);
    settle().await;
    assert!(reward.is_running());
}

// ---------------------------------------------------------------------------
// JobCoordinator
// ---------------------------------------------------------------------------

fn broadcast_config() -> BroadcastConfig {
    BroadcastConfig::from_options(150, "P240p30fps16x9,P360p30fps16x9").unwrap()
}

#[tokio::test]
async fn test_create_job_records_request() {
    let harness = ChainHarness::new(MockLedger::new());
    let coordinator = harness.job_coordinator();
    let stream = StreamId::mint(&NodeId::random(), "source");
    let broadcast = broadcast_config();

    let block = harness.ledger.current_block();
    let job = coordinator.create_job(&stream, &broadcast).await.unwrap();

    assert!(job.receipt.succeeded());
    assert_eq!(job.fingerprint, broadcast.fingerprint());
    assert_eq!(harness.ledger.jobs(), vec![job.request.clone()]);
    assert_eq!(job.request.stream_id, stream.to_string());
    assert_eq!(job.request.max_price_per_segment, 150);
    assert_eq!(job.request.end_block, block + DEFAULT_JOB_LENGTH);
}

#[tokio::test(start_paused = true)]
async fn test_create_job_times_out_when_never_mined() {
    let harness = ChainHarness::with_tx_timeout(
        MockLedger::new().with_tx_behavior(TxBehavior::Pending),
        Duration::from_secs(10),
    );
    let coordinator = harness.job_coordinator();
    let stream = StreamId::mint(&NodeId::random(), "source");

    let err = coordinator
        .create_job(&stream, &broadcast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::TxTimeout { .. }));
    assert_eq!(harness.ledger.jobs().len(), 1);
}

#[tokio::test]
async fn test_create_job_submission_failure() {
    let harness = ChainHarness::new(MockLedger::new());
    harness.ledger.set_fail_submissions(true);
    let coordinator = harness.job_coordinator();
    let stream = StreamId::mint(&NodeId::random(), "source");

    let err = coordinator
        .create_job(&stream, &broadcast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Submission(_)));
}

#[tokio::test]
async fn test_new_job_forwarding_filters_broadcaster() {
    let ours = H160::from_low_u64_be(0xb0b);
    let harness = ChainHarness::new(MockLedger::new().with_account(ours));
    let (tx, mut jobs) = mpsc::channel::<NewJobEvent>(8);
    let _mine = harness
        .monitor
        .subscribe_new_job(Some(ours), JobForwarder::new(tx))
        .await
        .unwrap();

    let (other_tx, mut other_jobs) = mpsc::channel::<NewJobEvent>(8);
    let _other = harness
        .monitor
        .subscribe_new_job(Some(H160::from_low_u64_be(0xdead)), JobForwarder::new(other_tx))
        .await
        .unwrap();

    let stream = StreamId::mint(&NodeId::random(), "source");
    harness
        .job_coordinator()
        .create_job(&stream, &broadcast_config())
        .await
        .unwrap();

    let event = tokio::time::timeout(WAIT, jobs.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.broadcaster, ours);
    assert_eq!(event.job_id, 1);
    assert_eq!(event.stream_id, stream.to_string());
    assert_eq!(event.max_price_per_segment, 150);

    settle().await;
    assert!(other_jobs.try_recv().is_err());
}

#[tokio::test]
async fn test_job_watch_stops_when_receiver_dropped() {
    let harness = ChainHarness::new(MockLedger::new());
    let (tx, jobs) = mpsc::channel::<NewJobEvent>(1);
    let subscription = harness
        .monitor
        .subscribe_new_job(None, JobForwarder::new(tx))
        .await
        .unwrap();
    drop(jobs);

    let stream = StreamId::mint(&NodeId::random(), "source");
    harness
        .job_coordinator()
        .create_job(&stream, &broadcast_config())
        .await
        .unwrap();

    assert!(eventually(WAIT, || subscription.is_finished()).await);
}
