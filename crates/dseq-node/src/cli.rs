//! CLI argument parsing for dseq

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Deterministic transaction sequencer
#[derive(Parser, Debug)]
#[command(name = "dseq")]
#[command(about = "Deterministic transaction sequencer")]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// dseq commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single-replica sequencer fed from stdin
    Start(StartArgs),
    /// Print committed entries of the entry log
    Read(ReadArgs),
}

/// Arguments of `dseq start`. Unset flags fall back to `<home>/config/node.json`.
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Node home directory
    #[arg(long)]
    pub home: PathBuf,

    /// Node moniker
    #[arg(long)]
    pub moniker: Option<String>,

    /// Sequencer address (20-byte hex)
    #[arg(long)]
    pub address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Block time in seconds
    #[arg(long)]
    pub block_time: Option<u64>,

    /// Maximum transactions per block
    #[arg(long)]
    pub max_block_txs: Option<usize>,

    /// Maximum transactions waiting for a block
    #[arg(long)]
    pub mempool_size: Option<usize>,
}

/// Arguments of `dseq read`
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Node home directory
    #[arg(long)]
    pub home: PathBuf,

    /// First entry number to print
    #[arg(long, default_value = "0")]
    pub from: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
