//! Ledger event monitor.
//!
//! Each subscription owns a bounded delivery queue fed by the ledger client
//! and a worker task that hands every item to an [`EventHandler`]. The worker
//! stops when:
//! - the queue is closed through [`Subscription::close`] or by dropping the handle
//! - the upstream subscription reports an error
//! - the handler returns an error
//!
//! A handler call already in progress always runs to completion.

use std::sync::Arc;

use async_trait::async_trait;
use sp_core::H160;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ChainError, ChainResult};
use crate::events::{address_topic, event_topic, NEW_JOB_SIGNATURE, NEW_ROUND_SIGNATURE};
use crate::ledger::{ContractName, Header, LedgerClient, Log, LogFilter, UpstreamSubscription};

/// Callback invoked for every delivered item.
///
/// Returning an error ends the subscription.
#[async_trait]
pub trait EventHandler<T: Send + 'static>: Send + 'static {
    /// Handle one item.
    async fn handle(&mut self, item: T) -> ChainResult<()>;
}

/// Configuration for the event monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Capacity of each delivery queue.
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// Handle to a running watch.
///
/// Dropping the handle closes the delivery queue.
#[derive(Debug)]
pub struct Subscription {
    kind: &'static str,
    close_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Event kind being watched.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Close the delivery queue. The worker exits after any in-flight
    /// handler call.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Wait for the worker to exit without closing the queue.
    pub async fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscribes to protocol events and dispatches them to handlers.
#[derive(Clone)]
pub struct EventMonitor {
    ledger: Arc<dyn LedgerClient>,
    config: MonitorConfig,
}

impl EventMonitor {
    /// Create a monitor over `ledger`.
    pub fn new(ledger: Arc<dyn LedgerClient>, config: MonitorConfig) -> Self {
        Self { ledger, config }
    }

    /// Get the monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Watch `NewJob` logs, optionally restricted to one broadcaster.
    ///
    /// `None` or the zero address watches every job.
    pub async fn subscribe_new_job<H>(
        &self,
        broadcaster: Option<H160>,
        handler: H,
    ) -> ChainResult<Subscription>
    where
        H: EventHandler<Log>,
    {
        let contract = self.contract(ContractName::JobsManager)?;
        let broadcaster_topic = broadcaster
            .filter(|b| !b.is_zero())
            .map(|b| address_topic(&b));

        let filter = LogFilter {
            addresses: vec![contract],
            topics: vec![Some(event_topic(NEW_JOB_SIGNATURE)), broadcaster_topic],
        };
        self.watch_logs("new_job", filter, handler).await
    }

    /// Watch `NewRound` logs.
    pub async fn subscribe_new_round<H>(&self, handler: H) -> ChainResult<Subscription>
    where
        H: EventHandler<Log>,
    {
        let contract = self.contract(ContractName::RoundsManager)?;
        let filter = LogFilter {
            addresses: vec![contract],
            topics: vec![Some(event_topic(NEW_ROUND_SIGNATURE))],
        };
        self.watch_logs("new_round", filter, handler).await
    }

    /// Watch new chain heads.
    pub async fn subscribe_new_blocks<H>(&self, handler: H) -> ChainResult<Subscription>
    where
        H: EventHandler<Header>,
    {
        let (sink, queue) = mpsc::channel(self.queue_capacity());
        let upstream = self.ledger.subscribe_new_heads(sink).await?;
        Ok(spawn_watch("new_blocks", queue, upstream, handler))
    }

    async fn watch_logs<H>(
        &self,
        kind: &'static str,
        filter: LogFilter,
        handler: H,
    ) -> ChainResult<Subscription>
    where
        H: EventHandler<Log>,
    {
        let (sink, queue) = mpsc::channel(self.queue_capacity());
        let upstream = self.ledger.subscribe_logs(filter, sink).await?;
        Ok(spawn_watch(kind, queue, upstream, handler))
    }

    fn contract(&self, name: ContractName) -> ChainResult<H160> {
        self.ledger
            .contract_address(name)
            .ok_or(ChainError::MissingContractAddress(name))
    }

    fn queue_capacity(&self) -> usize {
        self.config.queue_capacity.max(1)
    }
}

fn spawn_watch<T, H>(
    kind: &'static str,
    queue: mpsc::Receiver<T>,
    upstream: UpstreamSubscription,
    handler: H,
) -> Subscription
where
    T: Send + 'static,
    H: EventHandler<T>,
{
    let (close_tx, close_rx) = oneshot::channel();
    let worker = tokio::spawn(run_watch(kind, queue, upstream, close_rx, handler));
    info!(kind, "Event watch started");

    Subscription {
        kind,
        close_tx: Some(close_tx),
        worker: Some(worker),
    }
}

async fn run_watch<T, H>(
    kind: &'static str,
    mut queue: mpsc::Receiver<T>,
    mut upstream: UpstreamSubscription,
    mut close_rx: oneshot::Receiver<()>,
    mut handler: H,
) where
    T: Send + 'static,
    H: EventHandler<T>,
{
    loop {
        tokio::select! {
            biased;

            _ = &mut close_rx => {
                debug!(kind, "Delivery queue closed");
                break;
            }
            failure = upstream.failed() => {
                match failure {
                    Some(e) => warn!(kind, error = %e, "Upstream subscription failed"),
                    None => warn!(kind, "Upstream subscription ended"),
                }
                break;
            }
            item = queue.recv() => match item {
                Some(item) => {
                    if let Err(e) = handler.handle(item).await {
                        error!(kind, error = %e, "Event handler failed, stopping watch");
                        break;
                    }
                }
                None => {
                    debug!(kind, "Ledger dropped delivery queue");
                    break;
                }
            },
        }
    }

    upstream.unsubscribe();
    info!(kind, "Event watch stopped");
}
