//! Ledger capability consumed by the coordination layer.
//!
//! Contract bindings live outside this crate. Anything that can read round
//! state, submit the protocol transactions and stream logs and headers into a
//! bounded queue can drive the services here.

use std::fmt;

use async_trait::async_trait;
use sp_core::{H160, H256};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ChainError, ChainResult};

/// Transaction hash.
pub type TxHash = H256;

/// Protocol contracts a ledger client may resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractName {
    /// Registry of all protocol contracts.
    Controller,
    /// Protocol token.
    Token,
    /// Stake and transcoder registration.
    BondingManager,
    /// Transcode job records.
    JobsManager,
    /// Round progression.
    RoundsManager,
    /// Devnet token faucet.
    Faucet,
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractName::Controller => "Controller",
            ContractName::Token => "Token",
            ContractName::BondingManager => "BondingManager",
            ContractName::JobsManager => "JobsManager",
            ContractName::RoundsManager => "RoundsManager",
            ContractName::Faucet => "Faucet",
        };
        f.write_str(name)
    }
}

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction hash.
    pub tx: TxHash,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// 1 on success, 0 on failure.
    pub status: u64,
}

impl Receipt {
    /// Whether execution succeeded.
    pub fn succeeded(&self) -> bool {
        self.status != 0
    }
}

/// A contract log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: H160,
    /// Indexed topics, `topics[0]` is the event signature.
    pub topics: Vec<H256>,
    /// ABI encoded non-indexed arguments.
    pub data: Vec<u8>,
    /// Block that contained the log.
    pub block_number: u64,
    /// Transaction that emitted the log.
    pub tx: TxHash,
}

/// A new chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: H256,
}

/// Log filter: any of `addresses`, and per position either a required topic
/// or `None` for a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Contracts to watch. Empty matches every address.
    pub addresses: Vec<H160>,
    /// Topic constraints by position.
    pub topics: Vec<Option<H256>>,
}

impl LogFilter {
    /// Whether `log` satisfies the filter.
    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

/// Arguments of a job creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Stream id string.
    pub stream_id: String,
    /// Option fingerprint as lowercase hex.
    pub transcoding_options: String,
    /// Price ceiling per segment.
    pub max_price_per_segment: u128,
    /// Block at which the job expires.
    pub end_block: u64,
}

/// Consumer side of an upstream log/header subscription.
///
/// Resolves [`failed`](Self::failed) when the producer reports an error or
/// goes away. Dropping it or calling [`unsubscribe`](Self::unsubscribe)
/// tells the producer to stop.
#[derive(Debug)]
pub struct UpstreamSubscription {
    error_rx: oneshot::Receiver<ChainError>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Producer side of an upstream subscription, held by the ledger client.
#[derive(Debug)]
pub struct UpstreamFeed {
    error_tx: Option<oneshot::Sender<ChainError>>,
    cancel_rx: oneshot::Receiver<()>,
}

/// Create a linked subscription/feed pair.
pub fn upstream_channel() -> (UpstreamSubscription, UpstreamFeed) {
    let (error_tx, error_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        UpstreamSubscription {
            error_rx,
            cancel_tx: Some(cancel_tx),
        },
        UpstreamFeed {
            error_tx: Some(error_tx),
            cancel_rx,
        },
    )
}

impl UpstreamSubscription {
    /// Wait for the producer to fail. `None` means it went away silently.
    pub async fn failed(&mut self) -> Option<ChainError> {
        (&mut self.error_rx).await.ok()
    }

    /// Ask the producer to stop delivering.
    pub fn unsubscribe(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl UpstreamFeed {
    /// Report a terminal error to the consumer.
    pub fn fail(&mut self, error: ChainError) {
        if let Some(tx) = self.error_tx.take() {
            let _ = tx.send(error);
        }
    }

    /// Whether the consumer unsubscribed or was dropped.
    pub fn is_cancelled(&mut self) -> bool {
        !matches!(
            self.cancel_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }
}

/// Ledger operations needed by the node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the node's account.
    fn account(&self) -> H160;

    /// Resolve a protocol contract.
    fn contract_address(&self, name: ContractName) -> Option<H160>;

    /// Latest block number.
    async fn block_number(&self) -> ChainResult<u64>;

    /// Stream logs matching `filter` into `sink`.
    async fn subscribe_logs(
        &self,
        filter: LogFilter,
        sink: mpsc::Sender<Log>,
    ) -> ChainResult<UpstreamSubscription>;

    /// Stream new heads into `sink`.
    async fn subscribe_new_heads(
        &self,
        sink: mpsc::Sender<Header>,
    ) -> ChainResult<UpstreamSubscription>;

    /// Wait until `tx` is mined. May wait forever, callers bound it.
    async fn wait_mined(&self, tx: TxHash) -> ChainResult<Receipt>;

    /// Current round according to the rounds contract.
    async fn current_round(&self) -> ChainResult<u64>;

    /// Last round that has been initialized.
    async fn last_initialized_round(&self) -> ChainResult<u64>;

    /// Submit the round initialization transaction.
    async fn initialize_round(&self) -> ChainResult<TxHash>;

    /// Whether this account is an active transcoder in `round`.
    async fn is_active_transcoder(&self, round: u64) -> ChainResult<bool>;

    /// Submit the reward claim transaction.
    async fn reward(&self) -> ChainResult<TxHash>;

    /// Submit a job creation transaction.
    async fn create_job(&self, job: JobRequest) -> ChainResult<TxHash>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(address: H160, topics: Vec<H256>) -> Log {
        Log {
            address,
            topics,
            data: vec![],
            block_number: 1,
            tx: H256::zero(),
        }
    }

    #[test]
    fn test_filter_matching() {
        let contract = H160::repeat_byte(1);
        let sig = H256::repeat_byte(2);
        let who = H256::repeat_byte(3);

        let filter = LogFilter {
            addresses: vec![contract],
            topics: vec![Some(sig), Some(who)],
        };
        assert!(filter.matches(&log(contract, vec![sig, who])));
        assert!(!filter.matches(&log(contract, vec![sig, H256::zero()])));
        assert!(!filter.matches(&log(H160::zero(), vec![sig, who])));
        assert!(!filter.matches(&log(contract, vec![sig])));

        let wildcard = LogFilter {
            addresses: vec![contract],
            topics: vec![Some(sig), None],
        };
        assert!(wildcard.matches(&log(contract, vec![sig, H256::zero()])));
    }

    #[tokio::test]
    async fn test_upstream_failure_reaches_consumer() {
        let (mut sub, mut feed) = upstream_channel();
        assert!(!feed.is_cancelled());

        feed.fail(ChainError::Subscription("connection reset".into()));
        assert!(matches!(
            sub.failed().await,
            Some(ChainError::Subscription(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_cancel_feed() {
        let (mut sub, mut feed) = upstream_channel();
        sub.unsubscribe();
        assert!(feed.is_cancelled());

        let (sub, mut feed) = upstream_channel();
        drop(sub);
        assert!(feed.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_feed_resolves_none() {
        let (mut sub, feed) = upstream_channel();
        drop(feed);
        assert!(sub.failed().await.is_none());
    }

    #[test]
    fn test_receipt_status() {
        let ok = Receipt {
            tx: H256::zero(),
            block_number: 1,
            status: 1,
        };
        assert!(ok.succeeded());
        assert!(!Receipt { status: 0, ..ok }.succeeded());
    }
}
