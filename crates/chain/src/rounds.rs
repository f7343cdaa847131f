//! Round initialization driven by new chain heads.
//!
//! Every head triggers a fresh read of the current and last initialized round.
//! When the chain lags, the node submits the initialization transaction and
//! waits for it. Whoever initializes first wins, so concurrent nodes racing on
//! the same head are harmless.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ChainError, ChainResult};
use crate::ledger::{Header, LedgerClient, Receipt};
use crate::monitor::{EventHandler, EventMonitor, Subscription};
use crate::tx_waiter::TxWaiter;

const SERVICE: &str = "rounds service";

/// Submits round initialization when the chain lags its current round.
#[derive(Clone)]
pub struct RoundInitializer {
    ledger: Arc<dyn LedgerClient>,
    waiter: TxWaiter,
}

impl RoundInitializer {
    /// Create an initializer.
    pub fn new(ledger: Arc<dyn LedgerClient>, waiter: TxWaiter) -> Self {
        Self { ledger, waiter }
    }

    /// Initialize the current round if needed.
    ///
    /// Returns `Ok(None)` when the round is already initialized.
    pub async fn try_initialize_round(&self) -> ChainResult<Option<Receipt>> {
        let current = self.ledger.current_round().await?;
        let last_initialized = self.ledger.last_initialized_round().await?;

        if last_initialized >= current {
            debug!(round = current, "Round already initialized");
            return Ok(None);
        }

        info!(round = current, last_initialized, "Initializing round");
        let tx = self.ledger.initialize_round().await?;
        let receipt = self.waiter.confirm(tx).await?;

        info!(round = current, tx = ?tx, block = receipt.block_number, "Round initialized");
        Ok(Some(receipt))
    }
}

#[async_trait]
impl EventHandler<Header> for RoundInitializer {
    async fn handle(&mut self, header: Header) -> ChainResult<()> {
        match self.try_initialize_round().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_retryable() => {
                warn!(block = header.number, error = %e, "Round initialization failed, retrying on next block");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Start/stop wrapper that keeps rounds initialized while running.
///
/// `start` and `stop` take `&mut self`; share the service behind a
/// `tokio::sync::Mutex` if more than one task controls it.
pub struct RoundsService {
    monitor: EventMonitor,
    initializer: RoundInitializer,
    subscription: Option<Subscription>,
}

impl RoundsService {
    /// Create a stopped service.
    pub fn new(ledger: Arc<dyn LedgerClient>, monitor: EventMonitor, waiter: TxWaiter) -> Self {
        Self {
            monitor,
            initializer: RoundInitializer::new(ledger, waiter),
            subscription: None,
        }
    }

    /// Subscribe to new blocks.
    pub async fn start(&mut self) -> ChainResult<()> {
        if self.subscription.is_some() {
            return Err(ChainError::AlreadyStarted(SERVICE));
        }

        let subscription = self
            .monitor
            .subscribe_new_blocks(self.initializer.clone())
            .await?;
        self.subscription = Some(subscription);

        info!("Rounds service started");
        Ok(())
    }

    /// Close the block subscription.
    pub fn stop(&mut self) -> ChainResult<()> {
        let mut subscription = self
            .subscription
            .take()
            .ok_or(ChainError::AlreadyStopped(SERVICE))?;
        subscription.close();

        info!("Rounds service stopped");
        Ok(())
    }

    /// Whether a subscription exists and its worker is alive.
    pub fn is_running(&self) -> bool {
        self.subscription.as_ref().map_or(false, |s| !s.is_finished())
    }

    /// Run one initialization check outside the subscription.
    pub async fn try_initialize_round(&self) -> ChainResult<Option<Receipt>> {
        self.initializer.try_initialize_round().await
    }
}
