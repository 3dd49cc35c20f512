//! Vela daemon — entry point for running a Vela node.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use vela_node::memory::{
    MemoryBlockStore, MemoryLedger, MemorySignatures, MemoryVerifier, NoopContracts, OpenProtocol,
};
use vela_node::{init_logging, NodeConfig, Services, VelaNode};
use vela_types::{Address, Block, BlockHash, BlockHeader, RoundInfo, Timestamp};

#[derive(Parser)]
#[command(name = "vela-daemon", about = "Vela consensus node daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags override them.
    #[arg(long, env = "VELA_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for block storage.
    #[arg(long, env = "VELA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "VELA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "VELA_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(&path.to_string_lossy())?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    init_logging(config.log_format(), &config.log_level);
    tracing::info!(
        data_dir = %config.data_dir.display(),
        protocol = config.protocol_version,
        seeds = config.consensus.seed_addresses.len(),
        "starting vela node"
    );

    let services = Services {
        blocks: Arc::new(MemoryBlockStore::new()),
        ledger: Arc::new(MemoryLedger::new()),
        txs: Arc::new(MemorySignatures::new()),
        verification: Arc::new(MemoryVerifier::default().with_equivocation_tracking()),
        contracts: Arc::new(NoopContracts),
        protocol: Arc::new(OpenProtocol::new(config.protocol_version)),
    };

    let genesis = dev_genesis(&config);
    let node = Arc::new(VelaNode::new(config, services, genesis));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = node.spawn_reconciler(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received — stopping node");
    let _ = shutdown_tx.send(true);
    reconciler.await?;

    tracing::info!(height = node.best_height().await, "vela daemon exited cleanly");
    Ok(())
}

/// A deterministic development genesis: block 0, packed by the first
/// configured seed (or the zero address) at a fixed time.
fn dev_genesis(config: &NodeConfig) -> Block {
    let packer = config
        .consensus
        .seed_addresses
        .first()
        .copied()
        .unwrap_or(Address::ZERO);
    let time = Timestamp::new(1_700_000_000);
    Block {
        header: BlockHeader {
            height: 0,
            hash: BlockHash::new([0x56; 32]),
            pre_hash: BlockHash::ZERO,
            packing_address: packer,
            time,
            round: RoundInfo {
                round_index: 1,
                round_start_time: time,
                member_count: 1,
                packing_index: 1,
                protocol_version: config.protocol_version,
            },
            signature: Vec::new(),
        },
        txs: Vec::new(),
    }
}
