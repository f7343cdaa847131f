//! Transcode job creation and job event forwarding.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vtn_types::{BroadcastConfig, OptionFingerprint, StreamId};

use crate::error::{ChainError, ChainResult};
use crate::events::NewJobEvent;
use crate::ledger::{JobRequest, LedgerClient, Log, Receipt};
use crate::monitor::EventHandler;
use crate::tx_waiter::{TxWaiter, TxWaiterConfig};

/// Blocks a job stays open for (about one day at 15s blocks).
pub const DEFAULT_JOB_LENGTH: u64 = 5760;

/// Configuration for [`JobCoordinator`].
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Job lifetime in blocks.
    pub job_length: u64,
    /// Confirmation settings for job transactions.
    pub tx: TxWaiterConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_length: DEFAULT_JOB_LENGTH,
            tx: TxWaiterConfig::default(),
        }
    }
}

/// A confirmed job.
#[derive(Debug, Clone)]
pub struct CreatedJob {
    /// Submitted arguments.
    pub request: JobRequest,
    /// Fingerprint of the requested profiles.
    pub fingerprint: OptionFingerprint,
    /// Mined receipt.
    pub receipt: Receipt,
}

/// Builds and submits job creation transactions.
///
/// Job creation is never retried automatically; a failed or timed out
/// confirmation is returned to the caller.
pub struct JobCoordinator {
    ledger: Option<Arc<dyn LedgerClient>>,
    config: JobConfig,
}

impl JobCoordinator {
    /// Create a coordinator. Without a ledger every call fails with
    /// [`ChainError::NoLedgerClient`].
    pub fn new(ledger: Option<Arc<dyn LedgerClient>>, config: JobConfig) -> Self {
        Self { ledger, config }
    }

    /// Get the coordinator configuration.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Arguments for a job created at `current_block`.
    pub fn build_request(
        &self,
        stream_id: &StreamId,
        broadcast: &BroadcastConfig,
        current_block: u64,
    ) -> (JobRequest, OptionFingerprint) {
        let fingerprint = broadcast.fingerprint();
        let request = JobRequest {
            stream_id: stream_id.to_string(),
            transcoding_options: fingerprint.to_hex(),
            max_price_per_segment: broadcast.max_price_per_segment,
            end_block: current_block.saturating_add(self.config.job_length),
        };
        (request, fingerprint)
    }

    /// Create a job for `stream_id` and wait for it to be mined.
    pub async fn create_job(
        &self,
        stream_id: &StreamId,
        broadcast: &BroadcastConfig,
    ) -> ChainResult<CreatedJob> {
        let ledger = self.ledger.as_ref().ok_or(ChainError::NoLedgerClient)?;

        let current_block = ledger.block_number().await?;
        let (request, fingerprint) = self.build_request(stream_id, broadcast, current_block);

        info!(
            stream_id = %stream_id,
            options = %request.transcoding_options,
            price = request.max_price_per_segment,
            end_block = request.end_block,
            "Creating transcode job"
        );

        let tx = ledger.create_job(request.clone()).await?;
        let waiter = TxWaiter::new(Arc::clone(ledger), self.config.tx.clone());
        let receipt = waiter.confirm(tx).await?;

        info!(stream_id = %stream_id, tx = ?tx, block = receipt.block_number, "Transcode job created");
        Ok(CreatedJob {
            request,
            fingerprint,
            receipt,
        })
    }
}

/// Forwards decoded `NewJob` logs into a channel.
///
/// Stops the watch once the receiving side is gone.
pub struct JobForwarder {
    sink: mpsc::Sender<NewJobEvent>,
}

impl JobForwarder {
    /// Forward into `sink`.
    pub fn new(sink: mpsc::Sender<NewJobEvent>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl EventHandler<Log> for JobForwarder {
    async fn handle(&mut self, log: Log) -> ChainResult<()> {
        let event = match NewJobEvent::decode(&log) {
            Ok(event) => event,
            Err(e) => {
                warn!(block = log.block_number, error = %e, "Skipping undecodable job log");
                return Ok(());
            }
        };

        debug!(job_id = event.job_id, stream_id = %event.stream_id, "New job observed");
        self.sink
            .send(event)
            .await
            .map_err(|_| ChainError::Subscription("job receiver dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtn_types::NodeId;

    #[test]
    fn test_build_request() {
        let coordinator = JobCoordinator::new(None, JobConfig::default());
        let stream = StreamId::mint(&NodeId::random(), "source");
        let broadcast =
            BroadcastConfig::from_options(250, "P360p30fps16x9,P240p30fps16x9").unwrap();

        let (request, fingerprint) = coordinator.build_request(&stream, &broadcast, 100);
        assert_eq!(request.stream_id, stream.to_string());
        assert_eq!(request.end_block, 100 + DEFAULT_JOB_LENGTH);
        assert_eq!(request.max_price_per_segment, 250);
        assert_eq!(request.transcoding_options, fingerprint.to_hex());
        assert_eq!(fingerprint.as_bytes().len(), 8);
    }

    #[tokio::test]
    async fn test_create_job_without_ledger() {
        let coordinator = JobCoordinator::new(None, JobConfig::default());
        let stream = StreamId::mint(&NodeId::random(), "source");
        let broadcast = BroadcastConfig::from_options(1, "P144p30fps16x9").unwrap();

        let result = coordinator.create_job(&stream, &broadcast).await;
        assert!(matches!(result, Err(ChainError::NoLedgerClient)));
    }
}
