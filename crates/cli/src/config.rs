//! Command-line configuration.

use crate::commands::{self, Command};
use anyhow::Context;
use clap::Parser;
use corelib::{MetadataProvider, TopologyConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "ringkv", version, about = "Sharded key-value ring tooling")]
pub struct CliConfig {
    /// Topology file (JSON list of node descriptors).
    #[arg(long, short, default_value = "topology.json")]
    pub config: PathBuf,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).with_target(false).compact().init();

        let topology = TopologyConfig::load(&self.config)
            .with_context(|| format!("loading topology from {}", self.config.display()))?;
        let metadata = MetadataProvider::new(&topology).context("building topology")?;

        match self.command {
            Command::Topology => commands::show_topology(&metadata),
            Command::Route { keys, hash } => commands::route(&metadata, &keys, hash),
            Command::Demo { key, value } => {
                let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
                runtime.block_on(commands::demo(&metadata, &key, value.as_bytes()))
            }
        }
    }
}
