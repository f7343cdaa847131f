//! # VTN Ledger Coordination
//!
//! Turns ledger state transitions into idempotent on-chain actions and
//! creates transcode jobs.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐  headers   ┌────────────────┐
//!                  │              │ ─────────▶ │ RoundsService  │ ──┐
//!  LedgerClient ──▶│ EventMonitor │  NewRound  ├────────────────┤   │  TxWaiter
//!                  │              │ ─────────▶ │ RewardService  │ ──┤ ────────▶ Receipt
//!                  └──────────────┘  NewJob    ├────────────────┤   │
//!                                   ─────────▶ │ JobForwarder   │   │
//!                                              └────────────────┘   │
//!  JobCoordinator ──────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`EventMonitor`]: Bounded delivery queue plus worker task per subscription
//! - [`RoundsService`]: Initializes the current round when the chain lags
//! - [`RewardService`]: Claims the round reward for active transcoders
//! - [`JobCoordinator`]: Submits job creation with an option fingerprint
//! - [`TxWaiter`]: Confirms transactions within a timeout
//!
//! ## Failure Policy
//!
//! Handlers log retryable errors and keep watching, so the next head or round
//! retries the action. Anything else ends the watch. Services never cache
//! round state; every decision re-reads the chain.
//!
//! ## Configuration
//!
//! Default configuration values:
//! - Delivery queue capacity: 256
//! - Transaction timeout: 60s
//! - Job length: 5760 blocks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod jobs;
pub mod ledger;
pub mod monitor;
pub mod reward;
pub mod rounds;
pub mod tx_waiter;

pub use error::{ChainError, ChainResult};
pub use events::{address_topic, event_topic, NewJobEvent, NewRoundEvent};
pub use jobs::{CreatedJob, JobConfig, JobCoordinator, JobForwarder, DEFAULT_JOB_LENGTH};
pub use ledger::{
    upstream_channel, ContractName, Header, JobRequest, LedgerClient, Log, LogFilter, Receipt,
    TxHash, UpstreamFeed, UpstreamSubscription,
};
pub use monitor::{EventHandler, EventMonitor, MonitorConfig, Subscription};
pub use reward::{RewardClaimer, RewardService};
pub use rounds::{RoundInitializer, RoundsService};
pub use tx_waiter::{TxWaiter, TxWaiterConfig, DEFAULT_TX_TIMEOUT};
