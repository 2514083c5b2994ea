//! Persistent application state
//!
//! The sequencer keeps exactly one record: `{size, height}` serialized as JSON
//! under [`STATE_KEY`]. `size` counts every committed transaction and is the
//! only input to the fingerprint replicas exchange to detect divergence.

use crate::db::{cf, Database};
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Key holding the serialized [`AppState`]
pub const STATE_KEY: &[u8] = b"stateKey";

/// Directory name of the RocksDB instance under the store path
pub const STATE_DB_NAME: &str = "state";

/// Length of [`AppState::fingerprint`] in bytes
pub const FINGERPRINT_LEN: usize = 8;

/// Committed application counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// Number of transactions committed so far
    pub size: u64,
    /// Height of the last committed block
    pub height: u64,
}

impl AppState {
    /// Create a state with the given counters
    pub fn new(size: u64, height: u64) -> Self {
        Self { size, height }
    }

    /// Deterministic 8-byte big-endian encoding of `size`.
    ///
    /// Height and transaction content are not part of the fingerprint.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        self.size.to_be_bytes()
    }

    /// State after finalizing `tx_count` transactions at `height`
    pub fn advance(&self, height: u64, tx_count: usize) -> Self {
        Self {
            size: self.size.saturating_add(tx_count as u64),
            height,
        }
    }

    /// Serialize to the persisted record format
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parse the persisted record format
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
    }
}

/// Durable store for [`AppState`]
pub struct StateStore {
    db: Database,
    path: PathBuf,
    state: AppState,
}

impl StateStore {
    /// Open the store under `path`, creating the directory if needed.
    ///
    /// An absent record yields `{size: 0, height: 0}`; a record that cannot be
    /// parsed is an error.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let db = Database::new(path.join(STATE_DB_NAME));
        db.open()?;

        let state = match db.get(cf::META, STATE_KEY)? {
            Some(bytes) if !bytes.is_empty() => AppState::from_bytes(&bytes)?,
            _ => AppState::default(),
        };

        tracing::info!(
            path = %path.display(),
            size = state.size,
            height = state.height,
            "state store opened"
        );

        Ok(Self { db, path, state })
    }

    /// Last committed state
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Fingerprint of the last committed state
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        self.state.fingerprint()
    }

    /// Overwrite the record with the in-memory state, synchronously.
    pub fn persist(&self) -> StorageResult<()> {
        self.write_record(&self.state)
    }

    /// Durably replace the committed state with `next`.
    ///
    /// The in-memory state only changes once the record is on disk; on error
    /// the previous state stays current.
    pub fn commit(&mut self, next: AppState) -> StorageResult<()> {
        self.write_record(&next)?;
        self.state = next;
        Ok(())
    }

    /// Release the database handle. A second call fails with `NotOpen`.
    pub fn close(&mut self) -> StorageResult<()> {
        self.db.close()
    }

    /// Whether the handle is still open
    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, state: &AppState) -> StorageResult<()> {
        let bytes = state.to_bytes()?;
        self.db.put(cf::META, STATE_KEY, &bytes)
    }
}
