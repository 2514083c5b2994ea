//! Sequencer error types

use dseq_storage::StorageError;
use dseq_stream::StreamError;
use thiserror::Error;

/// Errors surfaced by the sequencer.
///
/// Admission rejection is not an error; see [`crate::Verdict`].
#[derive(Debug, Error)]
pub enum SequencerError {
    /// Missing or invalid collaborator at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Durable storage could not be opened or read at startup
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Start, append or commit on the entry log failed; the block was rolled back
    #[error("log write error: {0}")]
    LogWrite(#[source] StreamError),

    /// Writing a block failed and so did the rollback
    #[error("log write error: {cause}; rollback failed: {rollback}")]
    RollbackFailed {
        /// Error that aborted the block
        cause: StreamError,
        /// Error returned by the rollback
        rollback: StreamError,
    },

    /// Persisting the application state failed
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// The entry log already holds a block at or past this height that is not
    /// the one being finalized
    #[error("entry log diverged at height {height}: log holds block {logged} with other content")]
    LogDiverged {
        /// Height being finalized
        height: u64,
        /// Height of the last block in the entry log
        logged: u64,
    },

    /// Phase invoked out of the Finalize → Commit sequence
    #[error("phase out of order: {0}")]
    PhaseOrder(String),

    /// A previous unrecoverable log failure stopped the sequencer
    #[error("sequencer halted after unrecoverable log failure")]
    Halted,
}

impl SequencerError {
    /// Whether the node can no longer make progress and must stop.
    ///
    /// A log write that rolled back cleanly leaves the log consistent; every
    /// other runtime failure leaves local state behind its peers or the log
    /// in an unknown state.
    pub fn is_unrecoverable(&self) -> bool {
        !matches!(self, SequencerError::LogWrite(_) | SequencerError::PhaseOrder(_))
    }
}

/// Result type for sequencer operations
pub type SequencerResult<T> = Result<T, SequencerError>;
