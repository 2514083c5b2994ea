//! Sequence ledger: an audit file of committed transaction hashes
//!
//! One line per committed transaction, `0x<keccak256 hex>\n`, in commit order.
//! Comparing the files of two replicas shows whether they sequenced the same
//! transactions in the same order. Write failures are logged and swallowed.

use crate::error::{SequencerError, SequencerResult};
use dseq_primitives::keccak256;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ledger file name inside the node home directory
pub const SEQUENCE_FILE: &str = "dseq.txt";

/// Append-only ledger of committed transaction hashes
pub struct SequenceLedger {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
    lines: u64,
}

impl SequenceLedger {
    /// Open (or create) `dseq.txt` under `home` for appending
    pub fn open(home: impl AsRef<Path>) -> SequencerResult<Self> {
        let path = home.as_ref().join(SEQUENCE_FILE);
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                SequencerError::Initialization(format!(
                    "failed to open sequence ledger {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(Self {
            writer: Box::new(file),
            path: Some(path),
            lines: 0,
        })
    }

    /// Ledger over an arbitrary writer
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            path: None,
            lines: 0,
        }
    }

    /// The line recorded for `tx`
    pub fn line_for(tx: &[u8]) -> String {
        format!("{}\n", keccak256(tx).to_hex())
    }

    /// Append the line for `tx`
    pub fn record(&mut self, tx: &[u8]) {
        let line = Self::line_for(tx);
        match self.writer.write_all(line.as_bytes()) {
            Ok(()) => self.lines += 1,
            Err(e) => tracing::warn!(error = %e, "failed to write sequence ledger line"),
        }
    }

    /// Flush buffered lines
    pub fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "failed to flush sequence ledger");
        }
    }

    /// Lines written by this handle
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// File path, when file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
