//! # dseq-storage
//!
//! Durable storage for the sequencer's application state.
//!
//! This crate provides:
//! - A RocksDB wrapper with column families and synced writes ([`Database`])
//! - The persistent state store holding `{size, height}` ([`StateStore`])
//! - The deterministic state fingerprint ([`AppState::fingerprint`])

#![warn(missing_docs)]
#![warn(clippy::all)]

mod db;
mod error;
mod state;

pub use db::{cf, Database, DbConfig, ALL_CFS};
pub use error::{StorageError, StorageResult};
pub use state::{AppState, StateStore, FINGERPRINT_LEN, STATE_DB_NAME, STATE_KEY};
