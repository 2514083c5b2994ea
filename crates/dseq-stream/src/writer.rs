//! Atomic writer contract

use crate::entry::{EntryType, LoggedBlock};
use crate::error::StreamResult;

/// Append-only log written in all-or-nothing units.
///
/// At most one atomic operation is open at a time. Every
/// [`start_atomic_op`](Self::start_atomic_op) pairs with exactly one
/// [`commit_atomic_op`](Self::commit_atomic_op) or
/// [`rollback_atomic_op`](Self::rollback_atomic_op). Entries appended inside
/// an operation become visible to readers together at commit, or never.
pub trait AtomicStreamWriter {
    /// Open an atomic operation
    fn start_atomic_op(&mut self) -> StreamResult<()>;

    /// Append an entry to the open operation, returning its entry number
    fn append_entry(&mut self, kind: EntryType, payload: &[u8]) -> StreamResult<u64>;

    /// Seal every entry appended since start as one visible unit
    fn commit_atomic_op(&mut self) -> StreamResult<()>;

    /// Discard every entry appended since start
    fn rollback_atomic_op(&mut self) -> StreamResult<()>;

    /// Height and digest carried by the last committed BlockEnd entry
    fn last_block(&self) -> Option<LoggedBlock>;

    /// Height carried by the last committed BlockEnd entry
    fn last_block_height(&self) -> Option<u64> {
        self.last_block().map(|block| block.height)
    }
}
