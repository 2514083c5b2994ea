//! File-backed atomic entry log

use crate::entry::{EntryType, LoggedBlock, StreamEntry, StreamType, BLOCK_DIGEST_LEN};
use crate::error::{StreamError, StreamResult};
use crate::writer::AtomicStreamWriter;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File magic
pub const MAGIC: &[u8; 4] = b"DSEQ";

/// On-disk format version
pub const FORMAT_VERSION: u8 = 1;

/// Header size: magic, version, stream type, entries, length, last block
/// height, last block digest
pub const HEADER_LEN: u64 = 4 + 1 + 8 + 8 + 8 + 8 + BLOCK_DIGEST_LEN as u64;

/// Committed view of the log, rewritten at every commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) stream_type: StreamType,
    /// Number of committed entries
    pub(crate) entries: u64,
    /// Committed file length in bytes, header included
    pub(crate) length: u64,
    /// Height of the last committed BlockEnd, 0 when none
    pub(crate) last_block_height: u64,
    /// Digest carried by the last committed BlockEnd
    pub(crate) last_block_digest: [u8; BLOCK_DIGEST_LEN],
}

impl Header {
    fn new(stream_type: StreamType) -> Self {
        Self {
            stream_type,
            entries: 0,
            length: HEADER_LEN,
            last_block_height: 0,
            last_block_digest: [0u8; BLOCK_DIGEST_LEN],
        }
    }

    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = FORMAT_VERSION;
        buf[5..13].copy_from_slice(&self.stream_type.0.to_be_bytes());
        buf[13..21].copy_from_slice(&self.entries.to_be_bytes());
        buf[21..29].copy_from_slice(&self.length.to_be_bytes());
        buf[29..37].copy_from_slice(&self.last_block_height.to_be_bytes());
        buf[37..].copy_from_slice(&self.last_block_digest);
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN as usize]) -> StreamResult<Self> {
        if &buf[0..4] != MAGIC {
            return Err(StreamError::Corrupt("bad magic".into()));
        }
        if buf[4] != FORMAT_VERSION {
            return Err(StreamError::Corrupt(format!("unsupported format version {}", buf[4])));
        }
        let field = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[at..at + 8]);
            u64::from_be_bytes(bytes)
        };
        let mut last_block_digest = [0u8; BLOCK_DIGEST_LEN];
        last_block_digest.copy_from_slice(&buf[37..]);
        let header = Self {
            stream_type: StreamType(field(5)),
            entries: field(13),
            length: field(21),
            last_block_height: field(29),
            last_block_digest,
        };
        if header.length < HEADER_LEN {
            return Err(StreamError::Corrupt(format!("committed length {} below header", header.length)));
        }
        Ok(header)
    }

    pub(crate) fn read_from<R: Read + Seek>(reader: &mut R) -> StreamResult<Self> {
        let mut buf = [0u8; HEADER_LEN as usize];
        reader.seek(SeekFrom::Start(0))?;
        reader
            .read_exact(&mut buf)
            .map_err(|e| StreamError::Corrupt(format!("short header: {}", e)))?;
        Self::decode(&buf)
    }

    pub(crate) fn last_block(&self) -> Option<LoggedBlock> {
        (self.last_block_height != 0).then_some(LoggedBlock {
            height: self.last_block_height,
            digest: self.last_block_digest,
        })
    }
}

/// Crash-consistent entry log in a single file.
///
/// Appends are written past the committed end. Commit syncs the data, then
/// rewrites and syncs the header; only the header decides what is committed.
/// Rollback, and reopening after a crash, truncate back to the committed end.
/// Rollback also rewrites the header, since a commit that failed while
/// syncing the header may already have left the new one on disk.
pub struct FileStream {
    file: File,
    path: PathBuf,
    header: Header,
    write_pos: u64,
    next_number: u64,
    pending_last_block: Option<LoggedBlock>,
    in_op: bool,
}

impl FileStream {
    /// Open or create the log at `path` for `stream_type`
    pub fn open(path: impl AsRef<Path>, stream_type: StreamType) -> StreamResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let header = if file_len == 0 {
            let header = Header::new(stream_type);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.encode())?;
            file.sync_all()?;
            header
        } else {
            let header = Header::read_from(&mut file)?;
            if header.stream_type != stream_type {
                return Err(StreamError::StreamTypeMismatch {
                    expected: stream_type,
                    found: header.stream_type,
                });
            }
            if file_len < header.length {
                return Err(StreamError::Corrupt(format!(
                    "file is {} bytes, header commits {}",
                    file_len, header.length
                )));
            }
            if file_len > header.length {
                tracing::warn!(
                    path = %path.display(),
                    discarded = file_len - header.length,
                    "truncating uncommitted stream tail"
                );
                file.set_len(header.length)?;
                file.sync_all()?;
            }
            header
        };

        tracing::info!(
            path = %path.display(),
            entries = header.entries,
            last_block = header.last_block_height,
            "stream opened"
        );

        Ok(Self {
            file,
            path,
            header,
            write_pos: header.length,
            next_number: header.entries,
            pending_last_block: None,
            in_op: false,
        })
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream type recorded in the header
    pub fn stream_type(&self) -> StreamType {
        self.header.stream_type
    }

    /// Number of committed entries
    pub fn entry_count(&self) -> u64 {
        self.header.entries
    }

    /// Committed length in bytes, header included
    pub fn committed_len(&self) -> u64 {
        self.header.length
    }

    /// Whether an atomic operation is open
    pub fn is_in_atomic_op(&self) -> bool {
        self.in_op
    }

    fn write_header(&mut self, header: &Header) -> StreamResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.encode())?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl AtomicStreamWriter for FileStream {
    fn start_atomic_op(&mut self) -> StreamResult<()> {
        if self.in_op {
            return Err(StreamError::AtomicOpInProgress);
        }
        self.in_op = true;
        self.write_pos = self.header.length;
        self.next_number = self.header.entries;
        self.pending_last_block = None;
        Ok(())
    }

    fn append_entry(&mut self, kind: EntryType, payload: &[u8]) -> StreamResult<u64> {
        if !self.in_op {
            return Err(StreamError::NoAtomicOp);
        }
        let number = self.next_number;
        let frame = StreamEntry::new(number, kind, Bytes::copy_from_slice(payload)).encode()?;

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        self.file.write_all(&frame)?;

        self.write_pos += frame.len() as u64;
        self.next_number += 1;
        if kind == EntryType::BlockEnd {
            self.pending_last_block = LoggedBlock::from_marker(payload);
        }
        Ok(number)
    }

    fn commit_atomic_op(&mut self) -> StreamResult<()> {
        if !self.in_op {
            return Err(StreamError::NoAtomicOp);
        }
        self.file.sync_data()?;

        let mut next = self.header;
        next.entries = self.next_number;
        next.length = self.write_pos;
        if let Some(block) = self.pending_last_block {
            next.last_block_height = block.height;
            next.last_block_digest = block.digest;
        }
        self.write_header(&next)?;

        tracing::debug!(
            entries = next.entries - self.header.entries,
            total = next.entries,
            "stream atomic operation committed"
        );
        self.header = next;
        self.pending_last_block = None;
        self.in_op = false;
        Ok(())
    }

    fn rollback_atomic_op(&mut self) -> StreamResult<()> {
        if !self.in_op {
            return Err(StreamError::NoAtomicOp);
        }
        self.file.set_len(self.header.length)?;
        let committed = self.header;
        self.write_header(&committed)?;

        tracing::debug!(
            discarded = self.next_number - self.header.entries,
            "stream atomic operation rolled back"
        );
        self.write_pos = self.header.length;
        self.next_number = self.header.entries;
        self.pending_last_block = None;
        self.in_op = false;
        Ok(())
    }

    fn last_block(&self) -> Option<LoggedBlock> {
        self.header.last_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{block_end_marker, block_marker};
    use crate::reader::StreamReader;
    use tempfile::TempDir;

    fn write_block(stream: &mut FileStream, height: u64, txs: &[&[u8]]) {
        stream.start_atomic_op().unwrap();
        stream.append_entry(EntryType::BlockStart, &block_marker(height)).unwrap();
        for tx in txs {
            stream.append_entry(EntryType::Tx, tx).unwrap();
        }
        stream
            .append_entry(EntryType::BlockEnd, &block_end_marker(height, &[height as u8; 32]))
            .unwrap();
        stream.commit_atomic_op().unwrap();
    }

    #[test]
    fn test_new_file_has_only_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();

        assert_eq!(stream.entry_count(), 0);
        assert_eq!(stream.committed_len(), HEADER_LEN);
        assert_eq!(stream.last_block_height(), None);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_LEN);
    }

    #[test]
    fn test_commit_makes_entries_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();

        write_block(&mut stream, 5, &[b"tx_a", b"tx_b"]);
        assert_eq!(stream.entry_count(), 4);
        assert_eq!(stream.last_block_height(), Some(5));

        let entries: Vec<_> = StreamReader::open(&path).unwrap().map(Result::unwrap).collect();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EntryType::BlockStart, EntryType::Tx, EntryType::Tx, EntryType::BlockEnd]
        );
        assert_eq!(entries[1].payload.as_ref(), b"tx_a");
        assert_eq!(entries[2].payload.as_ref(), b"tx_b");
        assert_eq!(entries.iter().map(|e| e.number).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_uncommitted_entries_invisible_to_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();

        stream.start_atomic_op().unwrap();
        stream.append_entry(EntryType::BlockStart, &block_marker(1)).unwrap();

        assert_eq!(StreamReader::open(&path).unwrap().count(), 0);
    }

    #[test]
    fn test_rollback_restores_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
        write_block(&mut stream, 1, &[b"one"]);
        let before = std::fs::read(&path).unwrap();

        stream.start_atomic_op().unwrap();
        stream.append_entry(EntryType::BlockStart, &block_marker(2)).unwrap();
        stream.append_entry(EntryType::Tx, b"two").unwrap();
        stream.rollback_atomic_op().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(stream.last_block_height(), Some(1));

        write_block(&mut stream, 2, &[b"two"]);
        let numbers: Vec<_> = StreamReader::open(&path)
            .unwrap()
            .map(|e| e.unwrap().number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_last_block_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        {
            let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
            write_block(&mut stream, 4, &[b"x"]);
        }

        let stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
        assert_eq!(
            stream.last_block(),
            Some(LoggedBlock { height: 4, digest: [4u8; 32] })
        );
    }

    #[test]
    fn test_rollback_rewrites_header_of_failed_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
        write_block(&mut stream, 1, &[b"kept"]);
        let before = std::fs::read(&path).unwrap();

        stream.start_atomic_op().unwrap();
        stream.append_entry(EntryType::BlockStart, &block_marker(2)).unwrap();
        stream.append_entry(EntryType::Tx, b"lost").unwrap();

        // The header write of a commit landed, then its sync failed
        let mut torn = stream.header;
        torn.entries = stream.next_number;
        torn.length = stream.write_pos;
        stream.write_header(&torn).unwrap();

        stream.rollback_atomic_op().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
        drop(stream);

        let reopened = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
        assert_eq!(reopened.entry_count(), 3);
        assert_eq!(reopened.last_block_height(), Some(1));
        assert_eq!(StreamReader::open(&path).unwrap().count(), 3);
    }

    #[test]
    fn test_reopen_truncates_crashed_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        {
            let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
            write_block(&mut stream, 1, &[b"kept"]);
            stream.start_atomic_op().unwrap();
            stream.append_entry(EntryType::BlockStart, &block_marker(2)).unwrap();
            stream.append_entry(EntryType::Tx, b"lost").unwrap();
            // dropped without commit or rollback
        }

        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();
        assert_eq!(stream.entry_count(), 3);
        assert_eq!(stream.last_block_height(), Some(1));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), stream.committed_len());

        write_block(&mut stream, 2, &[b"again"]);
        let entries: Vec<_> = StreamReader::open(&path).unwrap().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[3].number, 3);
        assert_eq!(entries[4].payload.as_ref(), b"again");
    }

    #[test]
    fn test_operation_pairing_enforced() {
        let dir = TempDir::new().unwrap();
        let mut stream = FileStream::open(dir.path().join("dseq.bin"), StreamType::SEQUENCER).unwrap();

        assert!(matches!(stream.append_entry(EntryType::Tx, b"x"), Err(StreamError::NoAtomicOp)));
        assert!(matches!(stream.commit_atomic_op(), Err(StreamError::NoAtomicOp)));
        assert!(matches!(stream.rollback_atomic_op(), Err(StreamError::NoAtomicOp)));

        stream.start_atomic_op().unwrap();
        assert!(stream.is_in_atomic_op());
        assert!(matches!(stream.start_atomic_op(), Err(StreamError::AtomicOpInProgress)));
        stream.rollback_atomic_op().unwrap();
        assert!(!stream.is_in_atomic_op());
    }

    #[test]
    fn test_stream_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        FileStream::open(&path, StreamType::SEQUENCER).unwrap();

        let result = FileStream::open(&path, StreamType(7));
        assert!(matches!(
            result,
            Err(StreamError::StreamTypeMismatch { expected: StreamType(7), found: StreamType(1) })
        ));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        std::fs::write(&path, vec![0u8; HEADER_LEN as usize]).unwrap();
        assert!(matches!(
            FileStream::open(&path, StreamType::SEQUENCER),
            Err(StreamError::Corrupt(_))
        ));
    }

    #[test]
    fn test_empty_atomic_op_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dseq.bin");
        let mut stream = FileStream::open(&path, StreamType::SEQUENCER).unwrap();

        stream.start_atomic_op().unwrap();
        stream.commit_atomic_op().unwrap();
        assert_eq!(stream.entry_count(), 0);
        assert_eq!(stream.last_block_height(), None);
    }
}
