//! Reusable mock implementations of the node's external capabilities.

pub mod ledger;
pub mod network;
pub mod transcoder;

pub use ledger::{MockLedger, SubmittedTx, TxBehavior};
pub use network::{MemoryChannel, MemoryFabric, MemoryNetwork, SentResponse};
pub use transcoder::MockTranscoder;
