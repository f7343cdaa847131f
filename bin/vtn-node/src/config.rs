//! Node configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use sp_core::H160;
use vtn_chain::{JobConfig, MonitorConfig, TxWaiterConfig, DEFAULT_JOB_LENGTH};
use vtn_types::BroadcastConfig;
use vtn_video::{ManifestConfig, StreamConfig, SubscribeConfig, DEFAULT_STREAM_CAPACITY};

/// Node configuration loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity settings
    pub node: NodeSection,
    /// Ledger interaction
    pub chain: ChainSection,
    /// Job creation parameters
    pub broadcast: BroadcastSection,
    /// Data plane
    pub video: VideoSection,
    /// Devnet runner
    pub devnet: DevnetSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// JSON keystore holding the account key. A fresh key is generated
    /// when unset.
    pub keystore: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    /// Transaction confirmation timeout in seconds
    pub tx_timeout_secs: u64,
    /// Job lifetime in blocks
    pub job_length: u64,
    /// Event delivery queue capacity
    pub event_queue: usize,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            tx_timeout_secs: 60,
            job_length: DEFAULT_JOB_LENGTH,
            event_queue: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSection {
    /// Price ceiling per segment in token base units
    pub max_price_per_segment: u128,
    /// Comma separated profile names
    pub transcoding_options: String,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            max_price_per_segment: 1,
            transcoding_options: "P240p30fps16x9,P360p30fps16x9".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSection {
    /// Segments kept per local stream
    pub stream_capacity: usize,
    /// Inbound segment queue capacity
    pub subscribe_queue: usize,
    /// Wait window for remote master playlists in seconds
    pub playlist_wait_secs: u64,
    /// Only admit inbound segments signed by this address (0x hex)
    pub verify_signer: Option<String>,
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            subscribe_queue: 64,
            playlist_wait_secs: 60,
            verify_signer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetSection {
    /// Simulated block time in milliseconds
    pub block_interval_ms: u64,
    /// Blocks per simulated round
    pub blocks_per_round: u64,
    /// Synthetic source segments to broadcast
    pub segments: u64,
    /// Duration of each synthetic segment in milliseconds
    pub segment_duration_ms: u64,
}

impl Default for DevnetSection {
    fn default() -> Self {
        Self {
            block_interval_ms: 200,
            blocks_per_round: 5,
            segments: 6,
            segment_duration_ms: 2000,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow!("failed to parse TOML {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chain.tx_timeout_secs == 0 {
            bail!("chain.tx_timeout_secs must be > 0");
        }
        if self.chain.job_length == 0 {
            bail!("chain.job_length must be > 0");
        }
        if self.chain.event_queue == 0 {
            bail!("chain.event_queue must be > 0");
        }
        if self.video.stream_capacity == 0 {
            bail!("video.stream_capacity must be > 0");
        }
        if self.video.subscribe_queue == 0 {
            bail!("video.subscribe_queue must be > 0");
        }
        if self.devnet.block_interval_ms == 0 {
            bail!("devnet.block_interval_ms must be > 0");
        }
        if self.devnet.blocks_per_round == 0 {
            bail!("devnet.blocks_per_round must be > 0");
        }

        self.broadcast_config()?;
        self.verify_signer()?;
        Ok(())
    }

    /// Parsed job creation parameters
    pub fn broadcast_config(&self) -> Result<BroadcastConfig> {
        BroadcastConfig::from_options(
            self.broadcast.max_price_per_segment,
            &self.broadcast.transcoding_options,
        )
        .context("broadcast.transcoding_options")
    }

    /// Parsed signer restriction for inbound segments
    pub fn verify_signer(&self) -> Result<Option<H160>> {
        self.video
            .verify_signer
            .as_deref()
            .map(parse_address)
            .transpose()
            .context("video.verify_signer")
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            queue_capacity: self.chain.event_queue,
        }
    }

    pub fn tx_config(&self) -> TxWaiterConfig {
        TxWaiterConfig {
            timeout: Duration::from_secs(self.chain.tx_timeout_secs),
        }
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            job_length: self.chain.job_length,
            tx: self.tx_config(),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            capacity: self.video.stream_capacity,
        }
    }

    pub fn subscribe_config(&self) -> Result<SubscribeConfig> {
        Ok(SubscribeConfig {
            queue_capacity: self.video.subscribe_queue,
            expected_signer: self.verify_signer()?,
        })
    }

    pub fn manifest_config(&self) -> ManifestConfig {
        ManifestConfig {
            playlist_wait: Duration::from_secs(self.video.playlist_wait_secs),
            stream: self.stream_config(),
            ..ManifestConfig::default()
        }
    }
}

fn parse_address(value: &str) -> Result<H160> {
    let raw = value.trim().trim_start_matches("0x");
    let bytes = hex::decode(raw).map_err(|e| anyhow!("invalid address {value}: {e}"))?;
    if bytes.len() != 20 {
        bail!("invalid address {value}: expected 20 bytes, got {}", bytes.len());
    }
    Ok(H160::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtn.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let (_dir, path) = write_config("");
        let config = NodeConfig::load(&path).unwrap();

        assert_eq!(config.chain.tx_timeout_secs, 60);
        assert_eq!(config.chain.job_length, DEFAULT_JOB_LENGTH);
        assert_eq!(config.video.stream_capacity, DEFAULT_STREAM_CAPACITY);
        assert!(config.node.keystore.is_none());
        assert_eq!(config.broadcast_config().unwrap().profiles.len(), 2);
    }

    #[test]
    fn test_custom_values() {
        let (_dir, path) = write_config(
            r#"
[node]
keystore = "/var/lib/vtn/key.json"

[chain]
tx_timeout_secs = 30
job_length = 100

[broadcast]
max_price_per_segment = 250
transcoding_options = "P144p30fps16x9"

[video]
playlist_wait_secs = 5
verify_signer = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"

[devnet]
segments = 2
"#,
        );
        let config = NodeConfig::load(&path).unwrap();

        assert_eq!(config.node.keystore, Some(PathBuf::from("/var/lib/vtn/key.json")));
        assert_eq!(config.tx_config().timeout, Duration::from_secs(30));
        assert_eq!(config.job_config().job_length, 100);
        assert_eq!(config.manifest_config().playlist_wait, Duration::from_secs(5));
        assert_eq!(config.devnet.segments, 2);
        assert_eq!(config.devnet.blocks_per_round, 5);

        let broadcast = config.broadcast_config().unwrap();
        assert_eq!(broadcast.max_price_per_segment, 250);
        assert_eq!(broadcast.options(), "P144p30fps16x9");

        let signer = config.subscribe_config().unwrap().expected_signer.unwrap();
        assert_eq!(
            format!("{signer:#x}"),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let (_dir, path) = write_config("[chain]\ntx_timeout_secs = 0\n");
        let err = NodeConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("tx_timeout_secs"));
    }

    #[test]
    fn test_validation_rejects_unknown_profiles() {
        let mut config = NodeConfig::default();
        config.broadcast.transcoding_options = "P9000p,bogus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_signer() {
        let mut config = NodeConfig::default();
        config.video.verify_signer = Some("0x1234".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let (_dir, path) = write_config("[chain\n");
        assert!(NodeConfig::load(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(NodeConfig::load(dir.path().join("absent.toml")).is_err());
    }
}
