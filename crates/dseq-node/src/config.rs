//! Node configuration
//!
//! Read from `<home>/config/node.json` when present, then overridden by
//! command-line flags.

use crate::cli::StartArgs;
use dseq_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config directory under the home directory
pub const CONFIG_DIR: &str = "config";

/// Config file name
pub const CONFIG_FILE: &str = "node.json";

/// State store directory under the home directory
pub const STATE_DIR: &str = "state";

/// Entry log file under the home directory
pub const STREAM_FILE: &str = "dseq.bin";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is missing or out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Home directory; always taken from the command line
    #[serde(skip)]
    pub home: PathBuf,
    /// Node moniker
    #[serde(default = "default_moniker")]
    pub moniker: String,
    /// Sequencer address (hex)
    #[serde(default)]
    pub address: String,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between blocks
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    /// Maximum transactions per block
    #[serde(default = "default_max_block_txs")]
    pub max_block_txs: usize,
    /// Maximum transactions waiting for a block
    #[serde(default = "default_mempool_size")]
    pub mempool_size: usize,
}

fn default_moniker() -> String {
    "dseq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_block_time() -> u64 {
    1
}

fn default_max_block_txs() -> usize {
    100
}

fn default_mempool_size() -> usize {
    10_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::new(),
            moniker: default_moniker(),
            address: String::new(),
            log_level: default_log_level(),
            block_time: default_block_time(),
            max_block_txs: default_max_block_txs(),
            mempool_size: default_mempool_size(),
        }
    }
}

impl NodeConfig {
    /// Path of the config file under `home`
    pub fn config_path(home: &Path) -> PathBuf {
        home.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load the config of `home`, or the defaults if it has no config file
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = Self::config_path(home);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str::<NodeConfig>(&content)?
        } else {
            NodeConfig::default()
        };
        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Load the config named by `args.home` and apply the flags on top
    pub fn from_args(args: &StartArgs) -> Result<Self, ConfigError> {
        let mut config = Self::load(&args.home)?;
        config.apply(args);
        Ok(config)
    }

    /// Override fields with the flags that were given
    pub fn apply(&mut self, args: &StartArgs) {
        self.home = args.home.clone();
        if let Some(moniker) = &args.moniker {
            self.moniker = moniker.clone();
        }
        if let Some(address) = &args.address {
            self.address = address.clone();
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(secs) = args.block_time {
            self.block_time = secs;
        }
        if let Some(max) = args.max_block_txs {
            self.max_block_txs = max;
        }
        if let Some(size) = args.mempool_size {
            self.mempool_size = size;
        }
    }

    /// Check every field and return the parsed sequencer address
    pub fn validate(&self) -> Result<Address, ConfigError> {
        if self.home.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("home cannot be empty".into()));
        }
        if self.moniker.trim().is_empty() {
            return Err(ConfigError::Invalid("moniker cannot be empty".into()));
        }
        if self.block_time == 0 {
            return Err(ConfigError::Invalid("block time must be positive".into()));
        }
        if self.max_block_txs == 0 {
            return Err(ConfigError::Invalid("max block txs must be positive".into()));
        }
        if self.mempool_size == 0 {
            return Err(ConfigError::Invalid("mempool size must be positive".into()));
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("address is required".into()));
        }
        let address = Address::from_hex(&self.address)
            .map_err(|e| ConfigError::Invalid(format!("address: {}", e)))?;
        if address.is_zero() {
            return Err(ConfigError::Invalid("address cannot be zero".into()));
        }
        Ok(address)
    }

    /// State store directory
    pub fn state_dir(&self) -> PathBuf {
        self.home.join(STATE_DIR)
    }

    /// Entry log path
    pub fn stream_path(&self) -> PathBuf {
        self.home.join(STREAM_FILE)
    }

    /// Interval between blocks
    pub fn block_interval(&self) -> Duration {
        Duration::from_secs(self.block_time)
    }
}
