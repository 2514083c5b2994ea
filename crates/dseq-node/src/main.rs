//! dseq node binary
//!
//! `dseq start` runs a single-replica sequencer; `dseq read` prints the
//! committed entry log.

mod cli;
mod config;
mod driver;
mod node;
mod read;

use anyhow::{Context, Result};
use cli::{Cli, Command, ReadArgs, StartArgs};
use config::NodeConfig;
use driver::LocalDriver;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Command::Start(args) => start(args).await,
        Command::Read(args) => read_log(args),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn start(args: StartArgs) -> Result<()> {
    let config = NodeConfig::from_args(&args).context("failed to load node config")?;
    init_tracing(&config.log_level);

    let address = config.validate()?;
    tracing::info!("dseq node starting...");
    tracing::info!("Home directory: {:?}", config.home);

    let sequencer = node::open_sequencer(&config, address)?;
    let mut driver = LocalDriver::new(sequencer, config.max_block_txs, config.mempool_size);
    if let Some(height) = driver.uncommitted_log_height() {
        tracing::warn!(height, "entry log is ahead of committed state, replaying");
        let txs = node::logged_block_txs(&config, height)?;
        driver.replay(height, txs)?;
    }
    driver.run(config.block_interval()).await?;

    tracing::info!("dseq node stopped");
    Ok(())
}

fn read_log(args: ReadArgs) -> Result<()> {
    init_tracing(&args.log_level);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    read::print_entries(&args.home, args.from, &mut out)?;
    Ok(())
}
