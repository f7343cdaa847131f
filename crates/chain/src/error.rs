//! Error types for ledger coordination.
//!
//! Errors fall into configuration, lifecycle, transient ledger and
//! transaction classes. [`ChainError::is_retryable`] separates the ones a
//! later event may clear from the ones that need operator attention.

use sp_core::H256;
use thiserror::Error;
use vtn_types::TypesError;

use crate::ledger::ContractName;

/// Top-level error type for chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Contract is not registered with the ledger client.
    #[error("missing contract address for {0}")]
    MissingContractAddress(ContractName),

    /// `start` called while a subscription is active.
    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    /// `stop` called without an active subscription.
    #[error("{0} already stopped")]
    AlreadyStopped(&'static str),

    /// This account is not in the active transcoder set for the round.
    #[error("transcoder is not active in round {round}")]
    InactiveTranscoder {
        /// Round that was checked.
        round: u64,
    },

    /// Transaction was not mined within the timeout.
    #[error("transaction {tx:?} not mined after {timeout_ms}ms")]
    TxTimeout {
        /// Transaction hash.
        tx: H256,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Transaction was mined with a failure status.
    #[error("transaction {tx:?} reverted")]
    TxReverted {
        /// Transaction hash.
        tx: H256,
    },

    /// Ledger read or RPC failure.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Transaction submission failed before it reached the ledger.
    #[error("submission failed: {0}")]
    Submission(String),

    /// Upstream log or header subscription failed.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Operation needs a ledger client and none is configured.
    #[error("no ledger client configured")]
    NoLedgerClient,

    /// Log data could not be decoded.
    #[error("event decode failed: {0}")]
    Decode(String),

    /// Invalid identifiers or profiles.
    #[error("types error: {0}")]
    Types(#[from] TypesError),
}

impl ChainError {
    /// Whether a later attempt (usually the next event) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::Ledger(_)
                | ChainError::Submission(_)
                | ChainError::Subscription(_)
                | ChainError::TxTimeout { .. }
                | ChainError::TxReverted { .. }
        )
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::MissingContractAddress(ContractName::RoundsManager);
        assert_eq!(err.to_string(), "missing contract address for RoundsManager");

        let err = ChainError::AlreadyStarted("rounds service");
        assert_eq!(err.to_string(), "rounds service already started");

        let err = ChainError::TxTimeout {
            tx: H256::repeat_byte(0xab),
            timeout_ms: 60_000,
        };
        assert!(err.to_string().contains("60000ms"));
        assert!(err.to_string().contains("abab"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ChainError::Ledger("eof".into()).is_retryable());
        assert!(ChainError::TxReverted { tx: H256::zero() }.is_retryable());
        assert!(!ChainError::NoLedgerClient.is_retryable());
        assert!(!ChainError::AlreadyStopped("reward service").is_retryable());
        assert!(!ChainError::InactiveTranscoder { round: 3 }.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let err: ChainError = TypesError::UnknownProfile("x".into()).into();
        assert!(matches!(err, ChainError::Types(_)));
    }
}
