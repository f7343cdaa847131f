//! Bounded wait for transaction confirmation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ChainError, ChainResult};
use crate::ledger::{LedgerClient, Receipt, TxHash};

/// Default time to wait for a transaction to be mined.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(60);

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for [`TxWaiter`].
#[derive(Debug, Clone)]
pub struct TxWaiterConfig {
    /// How long to wait for a receipt.
    pub timeout: Duration,
}

impl Default for TxWaiterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TX_TIMEOUT,
        }
    }
}

/// Waits for submitted transactions and classifies the outcome.
///
/// Three outcomes are kept apart: mined successfully, mined with a failure
/// status ([`ChainError::TxReverted`]) and not mined in time
/// ([`ChainError::TxTimeout`]). Dropping the returned future cancels the wait.
#[derive(Clone)]
pub struct TxWaiter {
    ledger: Arc<dyn LedgerClient>,
    config: TxWaiterConfig,
}

impl TxWaiter {
    /// Create a waiter over `ledger`.
    pub fn new(ledger: Arc<dyn LedgerClient>, config: TxWaiterConfig) -> Self {
        Self { ledger, config }
    }

    /// Get the waiter configuration.
    pub fn config(&self) -> &TxWaiterConfig {
        &self.config
    }

    /// Wait with the configured timeout.
    pub async fn confirm(&self, tx: TxHash) -> ChainResult<Receipt> {
        self.confirm_with_timeout(tx, self.config.timeout).await
    }

    /// Wait with an explicit timeout.
    pub async fn confirm_with_timeout(&self, tx: TxHash, timeout: Duration) -> ChainResult<Receipt> {
        debug!(tx = ?tx, timeout_ms = duration_ms(timeout), "Waiting for transaction");

        let receipt = match tokio::time::timeout(timeout, self.ledger.wait_mined(tx)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(tx = ?tx, "Transaction not mined before timeout");
                return Err(ChainError::TxTimeout {
                    tx,
                    timeout_ms: duration_ms(timeout),
                });
            }
        };

        if !receipt.succeeded() {
            warn!(tx = ?tx, block = receipt.block_number, "Transaction reverted");
            return Err(ChainError::TxReverted { tx });
        }

        debug!(tx = ?tx, block = receipt.block_number, "Transaction mined");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_secs(60)), 60_000);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
