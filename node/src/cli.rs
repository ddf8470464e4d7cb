//! # CLI Interface
//!
//! Defines the command-line argument structure for `termvault-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `preview`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use termvault_contracts::Term;
use termvault_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};
use termvault_protocol::identity::Address;

/// TermVault service node.
///
/// Hosts the confidential token ledger and the fixed-term deposit bank,
/// serves them over a JSON API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "termvault-node",
    about = "TermVault confidential fixed-term deposit node",
    version,
    propagate_version = true
)]
pub struct TermVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the TermVault node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory and generate a fresh network key.
    Init(InitArgs),
    /// Compute the interest a deposit would earn, offline.
    Preview(PreviewArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Node data directory. Holds the sled database and the network key.
    #[arg(long, short = 'd', env = "TERMVAULT_DATA_DIR", default_value = ".termvault")]
    pub data_dir: PathBuf,

    /// Port for the JSON API.
    #[arg(long, env = "TERMVAULT_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TERMVAULT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "TERMVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Hex-encoded 32-byte network key.
    ///
    /// If not provided, the node reads `network.key` from the data directory.
    #[arg(long, env = "TERMVAULT_NETWORK_KEY", hide_env_values = true)]
    pub network_key: Option<String>,

    /// Address granted read access to every handle the ledger creates.
    /// Only takes effect when the node starts from an empty database.
    #[arg(long, env = "TERMVAULT_AUDITOR")]
    pub auditor: Option<Address>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "TERMVAULT_DATA_DIR", default_value = ".termvault")]
    pub data_dir: PathBuf,

    /// Overwrite an existing network key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `preview` subcommand.
#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Term code or alias: 0-3, 1m, 6m, 1y, 3y, one-month, ...
    #[arg(long, short = 't')]
    pub term: Term,

    /// Principal in micro-units (6 decimals).
    #[arg(long, short = 'p')]
    pub principal: u64,
}
