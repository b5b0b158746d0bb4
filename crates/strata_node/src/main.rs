//! STRATA Node
//!
//! Boots the partitions of a single-process cluster and runs them until
//! interrupted.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use strata_core::{NodeId, SystemClock};
use strata_node::{Node, NodeConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata-node")]
#[command(about = "STRATA partition node", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node id, overrides the config file
    #[arg(long)]
    node_id: Option<i32>,

    /// Number of partitions, overrides the config file
    #[arg(short, long)]
    partitions: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(node_id) = args.node_id {
        config = config.with_node_id(NodeId::new(node_id));
    }
    if let Some(partitions) = args.partitions {
        config = config.with_partition_count(partitions);
    }

    let node = Node::start(config, SystemClock::shared())?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    node.shutdown().await?;
    Ok(())
}
