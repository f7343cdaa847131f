//! Mock ledger for testing on-chain interactions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sp_core::{H160, H256};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use vtn_chain::{
    upstream_channel, ChainError, ChainResult, ContractName, Header, JobRequest, LedgerClient,
    Log, LogFilter, NewJobEvent, NewRoundEvent, Receipt, TxHash, UpstreamFeed,
    UpstreamSubscription,
};

/// How submitted transactions resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBehavior {
    /// Mined with status 1.
    Success,
    /// Mined with status 0.
    Revert,
    /// Never mined.
    Pending,
}

/// A submitted transaction for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedTx {
    /// Round initialization at the given current round.
    InitializeRound {
        /// Round being initialized.
        round: u64,
    },
    /// Reward claim in the given round.
    Reward {
        /// Round of the claim.
        round: u64,
    },
    /// Job creation.
    CreateJob(JobRequest),
}

struct LogSubscriber {
    filter: LogFilter,
    sink: mpsc::Sender<Log>,
    feed: UpstreamFeed,
}

struct HeadSubscriber {
    sink: mpsc::Sender<Header>,
    feed: UpstreamFeed,
}

struct LedgerState {
    block_number: u64,
    current_round: u64,
    last_initialized_round: u64,
    active_transcoder: bool,
    contracts: HashMap<ContractName, H160>,
    tx_behavior: TxBehavior,
    fail_reads: bool,
    fail_submissions: bool,
    submitted: Vec<(TxHash, SubmittedTx)>,
    outcomes: HashMap<TxHash, (TxBehavior, u64)>,
    next_tx: u64,
    next_job_id: u64,
    round_reads: usize,
    log_subs: Vec<LogSubscriber>,
    head_subs: Vec<HeadSubscriber>,
}

impl LedgerState {
    fn prune(&mut self) {
        self.log_subs
            .retain_mut(|s| !s.feed.is_cancelled() && !s.sink.is_closed());
        self.head_subs
            .retain_mut(|s| !s.feed.is_cancelled() && !s.sink.is_closed());
    }

    fn submit(&mut self, tx: SubmittedTx) -> ChainResult<(TxHash, TxBehavior)> {
        if self.fail_submissions {
            return Err(ChainError::Submission("nonce too low".into()));
        }
        self.next_tx += 1;
        let hash = H256::from_low_u64_be(self.next_tx);
        let behavior = self.tx_behavior;
        self.outcomes.insert(hash, (behavior, self.block_number + 1));
        self.submitted.push((hash, tx));
        Ok((hash, behavior))
    }

    fn read(&self) -> ChainResult<()> {
        if self.fail_reads {
            return Err(ChainError::Ledger("connection refused".into()));
        }
        Ok(())
    }
}

/// In-memory ledger with scripted round state and transaction outcomes.
///
/// # Example
///
/// ```rust,ignore
/// use vtn_simulation::mocks::{MockLedger, TxBehavior};
///
/// let ledger = Arc::new(MockLedger::new().with_rounds(6, 5));
/// ledger.emit_header().await;
/// assert_eq!(ledger.initialize_count(), 1);
/// ```
pub struct MockLedger {
    account: H160,
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Ledger with every protocol contract registered, round 1 initialized.
    pub fn new() -> Self {
        let contracts = [
            ContractName::Controller,
            ContractName::Token,
            ContractName::BondingManager,
            ContractName::JobsManager,
            ContractName::RoundsManager,
            ContractName::Faucet,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, H160::from_low_u64_be(0x1000 + i as u64)))
        .collect();

        Self {
            account: H160::from_low_u64_be(0xacc0),
            state: Mutex::new(LedgerState {
                block_number: 100,
                current_round: 1,
                last_initialized_round: 1,
                active_transcoder: true,
                contracts,
                tx_behavior: TxBehavior::Success,
                fail_reads: false,
                fail_submissions: false,
                submitted: Vec::new(),
                outcomes: HashMap::new(),
                next_tx: 0,
                next_job_id: 0,
                round_reads: 0,
                log_subs: Vec::new(),
                head_subs: Vec::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("mock ledger lock poisoned")
    }

    /// Configure the node account.
    pub fn with_account(mut self, account: H160) -> Self {
        self.account = account;
        self
    }

    /// Configure current and last initialized rounds.
    pub fn with_rounds(self, current: u64, last_initialized: u64) -> Self {
        self.set_rounds(current, last_initialized);
        self
    }

    /// Configure active transcoder status.
    pub fn with_active_transcoder(self, active: bool) -> Self {
        self.set_active_transcoder(active);
        self
    }

    /// Configure how transactions resolve.
    pub fn with_tx_behavior(self, behavior: TxBehavior) -> Self {
        self.set_tx_behavior(behavior);
        self
    }

    /// Unregister a contract.
    pub fn without_contract(self, name: ContractName) -> Self {
        self.state().contracts.remove(&name);
        self
    }

    /// Set round state.
    pub fn set_rounds(&self, current: u64, last_initialized: u64) {
        let mut state = self.state();
        state.current_round = current;
        state.last_initialized_round = last_initialized;
    }

    /// Set active transcoder status.
    pub fn set_active_transcoder(&self, active: bool) {
        self.state().active_transcoder = active;
    }

    /// Set how future transactions resolve.
    pub fn set_tx_behavior(&self, behavior: TxBehavior) {
        self.state().tx_behavior = behavior;
    }

    /// Make every read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Make every submission fail.
    pub fn set_fail_submissions(&self, fail: bool) {
        self.state().fail_submissions = fail;
    }

    /// Current block number.
    pub fn current_block(&self) -> u64 {
        self.state().block_number
    }

    /// Last initialized round.
    pub fn last_initialized(&self) -> u64 {
        self.state().last_initialized_round
    }

    /// Submitted transactions in order.
    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.state().submitted.iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Number of round initialization transactions.
    pub fn initialize_count(&self) -> usize {
        self.submitted()
            .iter()
            .filter(|tx| matches!(tx, SubmittedTx::InitializeRound { .. }))
            .count()
    }

    /// Number of reward transactions.
    pub fn reward_count(&self) -> usize {
        self.submitted()
            .iter()
            .filter(|tx| matches!(tx, SubmittedTx::Reward { .. }))
            .count()
    }

    /// Submitted job requests.
    pub fn jobs(&self) -> Vec<JobRequest> {
        self.submitted()
            .into_iter()
            .filter_map(|tx| match tx {
                SubmittedTx::CreateJob(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    /// Number of `current_round` reads.
    pub fn round_reads(&self) -> usize {
        self.state().round_reads
    }

    /// Live log subscriptions.
    pub fn log_subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.prune();
        state.log_subs.len()
    }

    /// Live head subscriptions.
    pub fn head_subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.prune();
        state.head_subs.len()
    }

    /// Mine a block and deliver its header.
    pub async fn emit_header(&self) -> u64 {
        let (header, sinks) = {
            let mut state = self.state();
            state.block_number += 1;
            state.prune();
            let header = Header {
                number: state.block_number,
                hash: H256::from_low_u64_be(state.block_number),
            };
            let sinks: Vec<_> = state.head_subs.iter().map(|s| s.sink.clone()).collect();
            (header, sinks)
        };

        trace!(block = header.number, subscribers = sinks.len(), "Mock block mined");
        for sink in sinks {
            let _ = sink.send(header.clone()).await;
        }
        header.number
    }

    /// Deliver `log` to matching log subscriptions.
    pub async fn emit_log(&self, log: Log) {
        let sinks: Vec<_> = {
            let mut state = self.state();
            state.prune();
            state
                .log_subs
                .iter()
                .filter(|s| s.filter.matches(&log))
                .map(|s| s.sink.clone())
                .collect()
        };

        for sink in sinks {
            let _ = sink.send(log.clone()).await;
        }
    }

    /// Start the next round and emit `NewRound`. Returns the new round.
    pub async fn advance_round(&self) -> u64 {
        let (log, round) = {
            let mut state = self.state();
            state.current_round += 1;
            let contract = state
                .contracts
                .get(&ContractName::RoundsManager)
                .copied()
                .unwrap_or_default();
            let event = NewRoundEvent {
                round: state.current_round,
            };
            (
                event.to_log(contract, state.block_number, H256::zero()),
                state.current_round,
            )
        };

        debug!(round, "Mock round advanced");
        self.emit_log(log).await;
        round
    }

    /// Fail every live upstream subscription.
    pub fn fail_subscriptions(&self, reason: &str) {
        let mut state = self.state();
        for sub in state.log_subs.iter_mut() {
            sub.feed.fail(ChainError::Subscription(reason.to_string()));
        }
        for sub in state.head_subs.iter_mut() {
            sub.feed.fail(ChainError::Subscription(reason.to_string()));
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn account(&self) -> H160 {
        self.account
    }

    fn contract_address(&self, name: ContractName) -> Option<H160> {
        self.state().contracts.get(&name).copied()
    }

    async fn block_number(&self) -> ChainResult<u64> {
        let state = self.state();
        state.read()?;
        Ok(state.block_number)
    }

    async fn subscribe_logs(
        &self,
        filter: LogFilter,
        sink: mpsc::Sender<Log>,
    ) -> ChainResult<UpstreamSubscription> {
        let (subscription, feed) = upstream_channel();
        self.state().log_subs.push(LogSubscriber { filter, sink, feed });
        Ok(subscription)
    }

    async fn subscribe_new_heads(
        &self,
        sink: mpsc::Sender<Header>,
    ) -> ChainResult<UpstreamSubscription> {
        let (subscription, feed) = upstream_channel();
        self.state().head_subs.push(HeadSubscriber { sink, feed });
        Ok(subscription)
    }

    async fn wait_mined(&self, tx: TxHash) -> ChainResult<Receipt> {
        let outcome = self.state().outcomes.get(&tx).copied();
        match outcome {
            None => Err(ChainError::Ledger(format!("unknown transaction {tx:?}"))),
            Some((TxBehavior::Pending, _)) => std::future::pending().await,
            Some((behavior, block_number)) => Ok(Receipt {
                tx,
                block_number,
                status: u64::from(behavior == TxBehavior::Success),
            }),
        }
    }

    async fn current_round(&self) -> ChainResult<u64> {
        let mut state = self.state();
        state.read()?;
        state.round_reads += 1;
        Ok(state.current_round)
    }

    async fn last_initialized_round(&self) -> ChainResult<u64> {
        let state = self.state();
        state.read()?;
        Ok(state.last_initialized_round)
    }

    async fn initialize_round(&self) -> ChainResult<TxHash> {
        let mut state = self.state();
        let round = state.current_round;
        let (hash, behavior) = state.submit(SubmittedTx::InitializeRound { round })?;
        if behavior == TxBehavior::Success {
            state.last_initialized_round = round;
        }
        Ok(hash)
    }

    async fn is_active_transcoder(&self, _round: u64) -> ChainResult<bool> {
        let state = self.state();
        state.read()?;
        Ok(state.active_transcoder)
    }

    async fn reward(&self) -> ChainResult<TxHash> {
        let mut state = self.state();
        let round = state.current_round;
        let (hash, _) = state.submit(SubmittedTx::Reward { round })?;
        Ok(hash)
    }

    async fn create_job(&self, job: JobRequest) -> ChainResult<TxHash> {
        let (hash, log) = {
            let mut state = self.state();
            let (hash, behavior) = state.submit(SubmittedTx::CreateJob(job.clone()))?;
            let contract = state.contracts.get(&ContractName::JobsManager).copied();

            let log = match (behavior, contract) {
                (TxBehavior::Success, Some(contract)) => {
                    state.next_job_id += 1;
                    let event = NewJobEvent {
                        broadcaster: self.account,
                        job_id: state.next_job_id,
                        stream_id: job.stream_id,
                        transcoding_options: job.transcoding_options,
                        max_price_per_segment: job.max_price_per_segment,
                        creation_block: state.block_number,
                    };
                    Some(event.to_log(contract, hash))
                }
                _ => None,
            };
            (hash, log)
        };

        if let Some(log) = log {
            debug!(tx = ?hash, "Mock job created");
            self.emit_log(log).await;
        }
        Ok(hash)
    }
}
