//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

pub use crate::commands::config::ConfigCommands;
pub use crate::commands::secret::SecretCommands;
pub use crate::commands::storage::StorageCommands;

/// cloud-proxy - cached secrets and chunked object copies across AWS and Azure
#[derive(Parser, Debug)]
#[command(name = "cloud-proxy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to config.yaml (default: ~/.cloud-proxy/config.yaml)
    #[arg(short, long, global = true, env = "CLOUD_PROXY_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read secrets through the cache
    #[command(subcommand)]
    Secret(SecretCommands),

    /// Object storage operations
    #[command(subcommand)]
    Storage(StorageCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}
