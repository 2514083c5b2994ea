//! # dseq-stream
//!
//! The append-only binary entry log consumed by downstream readers.
//!
//! This crate provides:
//! - The atomic writer contract ([`AtomicStreamWriter`]): start, append,
//!   commit, rollback
//! - Entry kinds and the on-disk frame format ([`EntryType`], [`StreamEntry`])
//! - A crash-consistent file-backed writer ([`FileStream`]) and its reader
//!   ([`StreamReader`])
//! - An in-memory writer with fault injection for tests ([`MemoryStream`])
//!
//! ## File layout
//!
//! ```text
//! +--------------------------------------------------------------+
//! | header: magic | version | stream type | entries | length |  |
//! |         last block height | last block digest                |
//! +--------------------------------------------------------------+
//! | frame: kind:u8 | number:u64 | len:u32 | payload              |
//! | frame ...                                                    |
//! +--------------------------------------------------------------+
//! | uncommitted tail (truncated on rollback and on open)         |
//! +--------------------------------------------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entry;
mod error;
mod file;
mod memory;
mod reader;
mod writer;

pub use entry::{
    block_end_marker, block_marker, marker_height, EntryType, LoggedBlock, StreamEntry,
    StreamType, BLOCK_DIGEST_LEN, BLOCK_END_MARKER_LEN, FRAME_HEADER_LEN,
};
pub use error::{StreamError, StreamResult};
pub use file::{FileStream, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use memory::MemoryStream;
pub use reader::StreamReader;
pub use writer::AtomicStreamWriter;
