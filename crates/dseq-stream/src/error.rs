//! Stream error types

use crate::entry::StreamType;
use thiserror::Error;

/// Entry-log errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Append, commit or rollback outside an atomic operation
    #[error("no atomic operation in progress")]
    NoAtomicOp,

    /// Start while another atomic operation is open
    #[error("atomic operation already in progress")]
    AtomicOpInProgress,

    /// Payload does not fit the frame length field
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Unknown entry kind in a frame
    #[error("unknown entry type: {0}")]
    UnknownEntryType(u8),

    /// Log file belongs to another application
    #[error("stream type mismatch: expected {expected}, found {found}")]
    StreamTypeMismatch {
        /// Stream type this writer was opened for
        expected: StreamType,
        /// Stream type recorded in the file
        found: StreamType,
    },

    /// Structurally invalid log file
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// Failure injected by [`crate::MemoryStream`]
    #[error("injected fault: {0}")]
    Injected(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;
