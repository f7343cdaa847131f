//! VTN Node Binary
//!
//! Subcommands:
//! - devnet: Run a broadcaster and a transcoder against an in-memory ledger
//!   and network
//! - fingerprint: Print the on-chain option fingerprint for a profile list
//! - keygen: Write a fresh account keystore

mod config;
mod devnet;
mod node;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vtn_types::{AccountSigner, BroadcastConfig, Keystore, LocalAccount};

use crate::config::NodeConfig;

#[derive(Parser)]
#[command(name = "vtn-node")]
#[command(about = "VTN Transcoding Network Node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Account keystore, overrides `node.keystore`
    #[arg(long)]
    keystore: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the in-memory devnet
    Devnet {
        /// Synthetic segments to broadcast, overrides `devnet.segments`
        #[arg(long)]
        segments: Option<u64>,

        /// Profiles to request, overrides `broadcast.transcoding_options`
        #[arg(long)]
        options: Option<String>,
    },
    /// Print the option fingerprint for a comma separated profile list
    Fingerprint {
        #[arg(long)]
        options: String,
    },
    /// Generate an account and write it to a keystore file
    Keygen {
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(keystore) = cli.keystore.clone() {
        config.node.keystore = Some(keystore);
    }

    match cli.command {
        Command::Devnet { segments, options } => {
            if let Some(segments) = segments {
                config.devnet.segments = segments;
            }
            if let Some(options) = options {
                config.broadcast.transcoding_options = options;
            }
            config.validate()?;

            let account = load_account(&config)?;
            info!(address = %format!("{:#x}", account.address()), "Starting devnet");

            tokio::select! {
                report = devnet::run(&config, account) => {
                    let report = report?;
                    info!(
                        job_id = report.job_id,
                        segments = report.segments_transcoded,
                        variants = report.variants,
                        blocks = report.blocks,
                        round_initializations = report.round_initializations,
                        rewards = report.rewards,
                        "Devnet run complete"
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down devnet");
                }
            }
        }
        Command::Fingerprint { options } => {
            let broadcast = BroadcastConfig::from_options(0, &options)?;
            println!("{}", broadcast.fingerprint().to_hex());
            for profile in &broadcast.profiles {
                println!("  {} {} {}kbps", profile.name, profile.resolution, profile.bitrate_kbps);
            }
        }
        Command::Keygen { out } => {
            if out.exists() {
                anyhow::bail!("refusing to overwrite {}", out.display());
            }
            let account = LocalAccount::generate();
            Keystore::save(&account, &out)
                .with_context(|| format!("failed to write keystore {}", out.display()))?;
            println!("{:#x}", account.address());
        }
    }

    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_account(config: &NodeConfig) -> Result<Arc<LocalAccount>> {
    match &config.node.keystore {
        Some(path) => Ok(Arc::new(Keystore::load(path)?)),
        None => {
            warn!("No keystore configured, generating an ephemeral account");
            Ok(Arc::new(LocalAccount::generate()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_devnet_overrides() {
        let cli = Cli::parse_from([
            "vtn-node",
            "--json-logs",
            "devnet",
            "--segments",
            "4",
            "--options",
            "P144p30fps16x9",
        ]);
        assert!(cli.json_logs);
        assert!(matches!(
            cli.command,
            Command::Devnet { segments: Some(4), options: Some(ref o) } if o == "P144p30fps16x9"
        ));
    }

    #[test]
    fn test_load_account_from_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        let account = LocalAccount::generate();
        Keystore::save(&account, &path).unwrap();

        let mut config = NodeConfig::default();
        config.node.keystore = Some(path);
        let loaded = load_account(&config).unwrap();
        assert_eq!(loaded.address(), account.address());
    }

    #[test]
    fn test_load_account_missing_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.node.keystore = Some(dir.path().join("absent.json"));
        assert!(load_account(&config).is_err());
    }
}
