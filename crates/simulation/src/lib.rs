//! # VTN Simulation Crate
//!
//! In-memory stand-ins for the capabilities a node consumes, so the chain
//! services and video relays can be exercised end to end without a ledger,
//! sockets or an encoder.
//!
//! ## Features
//!
//! - **Scripted ledger**: round state, transaction outcomes and event injection
//! - **Shared network fabric**: many nodes, one in-memory broadcast medium
//! - **Deterministic transcoder**: renditions derived from the input bytes
//! - **Deterministic timing**: works under `tokio::time::pause()`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vtn_simulation::{ChainHarness, mocks::MockLedger};
//!
//! #[tokio::test]
//! async fn test_rounds() {
//!     let harness = ChainHarness::new(MockLedger::new().with_rounds(6, 5));
//!     let mut rounds = harness.rounds_service();
//!     rounds.start().await.unwrap();
//!     harness.ledger.emit_header().await;
//! }
//! ```

pub mod harness;
pub mod mocks;
pub mod wait;

pub use harness::{ChainHarness, VideoHarness};
pub use wait::{eventually, settle};
