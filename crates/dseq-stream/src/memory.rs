//! In-memory entry log with fault injection

use crate::entry::{EntryType, LoggedBlock, StreamEntry};
use crate::error::{StreamError, StreamResult};
use crate::writer::AtomicStreamWriter;
use bytes::Bytes;

/// One-shot faults armed on a [`MemoryStream`]
#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    start: bool,
    /// Fail the append made after this many successful appends in the op
    append_after: Option<usize>,
    commit: bool,
    rollback: bool,
}

/// Entry log held in memory.
///
/// Follows the same contract as [`FileStream`](crate::FileStream) and lets
/// tests fail individual operations. Every armed fault fires once.
#[derive(Debug, Default)]
pub struct MemoryStream {
    committed: Vec<StreamEntry>,
    pending: Option<Vec<StreamEntry>>,
    last_block: Option<LoggedBlock>,
    pending_last_block: Option<LoggedBlock>,
    faults: Faults,
}

impl MemoryStream {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed entries
    pub fn entries(&self) -> &[StreamEntry] {
        &self.committed
    }

    /// Whether an atomic operation is open
    pub fn is_in_atomic_op(&self) -> bool {
        self.pending.is_some()
    }

    /// Fail the next start
    pub fn fail_next_start(&mut self) {
        self.faults.start = true;
    }

    /// Fail the append made after `n` successful appends in the next operation
    pub fn fail_append_after(&mut self, n: usize) {
        self.faults.append_after = Some(n);
    }

    /// Fail the next commit. The operation stays open.
    pub fn fail_next_commit(&mut self) {
        self.faults.commit = true;
    }

    /// Fail the next rollback. The operation stays open.
    pub fn fail_next_rollback(&mut self) {
        self.faults.rollback = true;
    }
}

impl AtomicStreamWriter for MemoryStream {
    fn start_atomic_op(&mut self) -> StreamResult<()> {
        if self.pending.is_some() {
            return Err(StreamError::AtomicOpInProgress);
        }
        if std::mem::take(&mut self.faults.start) {
            return Err(StreamError::Injected("start"));
        }
        self.pending = Some(Vec::new());
        self.pending_last_block = None;
        Ok(())
    }

    fn append_entry(&mut self, kind: EntryType, payload: &[u8]) -> StreamResult<u64> {
        let pending = self.pending.as_mut().ok_or(StreamError::NoAtomicOp)?;
        if self.faults.append_after == Some(pending.len()) {
            self.faults.append_after = None;
            return Err(StreamError::Injected("append"));
        }
        let number = (self.committed.len() + pending.len()) as u64;
        pending.push(StreamEntry::new(number, kind, Bytes::copy_from_slice(payload)));
        if kind == EntryType::BlockEnd {
            self.pending_last_block = LoggedBlock::from_marker(payload);
        }
        Ok(number)
    }

    fn commit_atomic_op(&mut self) -> StreamResult<()> {
        if self.pending.is_none() {
            return Err(StreamError::NoAtomicOp);
        }
        if std::mem::take(&mut self.faults.commit) {
            return Err(StreamError::Injected("commit"));
        }
        if let Some(entries) = self.pending.take() {
            self.committed.extend(entries);
        }
        if let Some(block) = self.pending_last_block.take() {
            self.last_block = Some(block);
        }
        Ok(())
    }

    fn rollback_atomic_op(&mut self) -> StreamResult<()> {
        if self.pending.is_none() {
            return Err(StreamError::NoAtomicOp);
        }
        if std::mem::take(&mut self.faults.rollback) {
            return Err(StreamError::Injected("rollback"));
        }
        self.pending = None;
        self.pending_last_block = None;
        Ok(())
    }

    fn last_block(&self) -> Option<LoggedBlock> {
        self.last_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{block_end_marker, block_marker};

    #[test]
    fn test_commit_and_numbering() {
        let mut stream = MemoryStream::new();
        stream.start_atomic_op().unwrap();
        assert_eq!(stream.append_entry(EntryType::BlockStart, &block_marker(1)).unwrap(), 0);
        assert_eq!(
            stream.append_entry(EntryType::BlockEnd, &block_end_marker(1, &[3u8; 32])).unwrap(),
            1
        );
        assert!(stream.entries().is_empty());
        stream.commit_atomic_op().unwrap();

        assert_eq!(stream.entries().len(), 2);
        assert_eq!(stream.last_block_height(), Some(1));
        assert_eq!(stream.last_block().map(|b| b.digest), Some([3u8; 32]));
    }

    #[test]
    fn test_append_fault_fires_once() {
        let mut stream = MemoryStream::new();
        stream.fail_append_after(1);
        stream.start_atomic_op().unwrap();
        stream.append_entry(EntryType::BlockStart, &[]).unwrap();
        assert!(matches!(
            stream.append_entry(EntryType::Tx, b"x"),
            Err(StreamError::Injected("append"))
        ));
        stream.append_entry(EntryType::Tx, b"y").unwrap();
        stream.rollback_atomic_op().unwrap();
        assert!(stream.entries().is_empty());
    }

    #[test]
    fn test_rollback_fault_keeps_op_open() {
        let mut stream = MemoryStream::new();
        stream.fail_next_rollback();
        stream.start_atomic_op().unwrap();
        assert!(stream.rollback_atomic_op().is_err());
        assert!(stream.is_in_atomic_op());
        stream.rollback_atomic_op().unwrap();
        assert!(!stream.is_in_atomic_op());
    }

    #[test]
    fn test_start_and_commit_faults() {
        let mut stream = MemoryStream::new();
        stream.fail_next_start();
        assert!(stream.start_atomic_op().is_err());
        stream.start_atomic_op().unwrap();

        stream.fail_next_commit();
        stream.append_entry(EntryType::Tx, b"x").unwrap();
        assert!(stream.commit_atomic_op().is_err());
        stream.commit_atomic_op().unwrap();
        assert_eq!(stream.entries().len(), 1);
    }
}
