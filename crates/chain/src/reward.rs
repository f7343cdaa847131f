//! Reward claiming driven by new rounds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{ChainError, ChainResult};
use crate::events::NewRoundEvent;
use crate::ledger::{LedgerClient, Log, Receipt};
use crate::monitor::{EventHandler, EventMonitor, Subscription};
use crate::tx_waiter::TxWaiter;

const SERVICE: &str = "reward service";

/// Claims the round reward when this account is an active transcoder.
#[derive(Clone)]
pub struct RewardClaimer {
    ledger: Arc<dyn LedgerClient>,
    waiter: TxWaiter,
}

impl RewardClaimer {
    /// Create a claimer.
    pub fn new(ledger: Arc<dyn LedgerClient>, waiter: TxWaiter) -> Self {
        Self { ledger, waiter }
    }

    /// Claim the reward for `round`.
    ///
    /// Fails with [`ChainError::InactiveTranscoder`] when the account is not
    /// in the active set for the round.
    pub async fn try_reward(&self, round: u64) -> ChainResult<Receipt> {
        if !self.ledger.is_active_transcoder(round).await? {
            return Err(ChainError::InactiveTranscoder { round });
        }

        info!(round, "Claiming reward");
        let tx = self.ledger.reward().await?;
        let receipt = self.waiter.confirm(tx).await?;

        info!(round, tx = ?tx, block = receipt.block_number, "Reward claimed");
        Ok(receipt)
    }
}

#[async_trait]
impl EventHandler<Log> for RewardClaimer {
    async fn handle(&mut self, log: Log) -> ChainResult<()> {
        let round = match NewRoundEvent::decode(&log) {
            Ok(event) => event.round,
            Err(e) => {
                warn!(block = log.block_number, error = %e, "Skipping undecodable round log");
                return Ok(());
            }
        };

        match self.try_reward(round).await {
            Ok(_) => Ok(()),
            Err(ChainError::InactiveTranscoder { round }) => {
                info!(round, "Not an active transcoder, skipping reward");
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!(round, error = %e, "Reward claim failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Start/stop wrapper that claims rewards every round while running.
pub struct RewardService {
    monitor: EventMonitor,
    claimer: RewardClaimer,
    subscription: Option<Subscription>,
}

impl RewardService {
    /// Create a stopped service.
    pub fn new(ledger: Arc<dyn LedgerClient>, monitor: EventMonitor, waiter: TxWaiter) -> Self {
        Self {
            monitor,
            claimer: RewardClaimer::new(ledger, waiter),
            subscription: None,
        }
    }

    /// Subscribe to new rounds.
    pub async fn start(&mut self) -> ChainResult<()> {
        if self.subscription.is_some() {
            return Err(ChainError::AlreadyStarted(SERVICE));
        }

        let subscription = self
            .monitor
            .subscribe_new_round(self.claimer.clone())
            .await?;
        self.subscription = Some(subscription);

        info!("Reward service started");
        Ok(())
    }

    /// Close the round subscription.
    pub fn stop(&mut self) -> ChainResult<()> {
        let mut subscription = self
            .subscription
            .take()
            .ok_or(ChainError::AlreadyStopped(SERVICE))?;
        subscription.close();

        info!("Reward service stopped");
        Ok(())
    }

    /// Whether a subscription exists and its worker is alive.
    pub fn is_running(&self) -> bool {
        self.subscription.as_ref().map_or(false, |s| !s.is_finished())
    }

    /// Claim the reward for `round` outside the subscription.
    pub async fn try_reward(&self, round: u64) -> ChainResult<Receipt> {
        self.claimer.try_reward(round).await
    }
}
