//! Reader over the committed part of a [`FileStream`](crate::FileStream) log

use crate::entry::{marker_height, EntryType, StreamEntry, StreamType, FRAME_HEADER_LEN};
use crate::error::{StreamError, StreamResult};
use crate::file::{Header, HEADER_LEN};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use bytes::Bytes;
use std::path::Path;

/// Iterates committed entries in order.
///
/// The committed length is captured at open; entries committed afterwards
/// need a fresh reader.
pub struct StreamReader {
    reader: BufReader<File>,
    header: Header,
    pos: u64,
}

impl StreamReader {
    /// Open the log at `path` for reading
    pub fn open(path: impl AsRef<Path>) -> StreamResult<Self> {
        let mut file = File::open(path.as_ref())?;
        let header = Header::read_from(&mut file)?;
        let file_len = file.metadata()?.len();
        if file_len < header.length {
            return Err(StreamError::Corrupt(format!(
                "file is {} bytes, header commits {}",
                file_len, header.length
            )));
        }
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        Ok(Self {
            reader: BufReader::new(file),
            header,
            pos: HEADER_LEN,
        })
    }

    /// Stream type recorded in the header
    pub fn stream_type(&self) -> StreamType {
        self.header.stream_type
    }

    /// Number of committed entries
    pub fn entry_count(&self) -> u64 {
        self.header.entries
    }

    /// Height of the last committed block
    pub fn last_block_height(&self) -> Option<u64> {
        self.header.last_block().map(|block| block.height)
    }

    /// Committed entries numbered `from` and above
    pub fn entries_from(self, from: u64) -> impl Iterator<Item = StreamResult<StreamEntry>> {
        self.filter(move |entry| entry.as_ref().map_or(true, |e| e.number >= from))
    }

    /// Transaction payloads of the committed block at `height`, or `None` if
    /// the log holds no complete block at that height
    pub fn block_txs(self, height: u64) -> StreamResult<Option<Vec<Bytes>>> {
        let mut current: Option<Vec<Bytes>> = None;
        for entry in self {
            let entry = entry?;
            match entry.kind {
                EntryType::BlockStart => {
                    current = (marker_height(&entry.payload) == Some(height)).then(Vec::new);
                }
                EntryType::Tx => {
                    if let Some(txs) = current.as_mut() {
                        txs.push(entry.payload);
                    }
                }
                EntryType::BlockEnd => {
                    if let Some(txs) = current.take() {
                        if marker_height(&entry.payload) == Some(height) {
                            return Ok(Some(txs));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for StreamReader {
    type Item = StreamResult<StreamEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.header.length {
            return None;
        }
        let left = (self.header.length - self.pos).saturating_sub(FRAME_HEADER_LEN as u64);
        let limit = usize::try_from(left).unwrap_or(usize::MAX);
        match StreamEntry::decode_within(&mut self.reader, limit) {
            Ok(entry) => {
                self.pos += entry.encoded_len() as u64;
                if self.pos > self.header.length {
                    self.pos = self.header.length;
                    return Some(Err(StreamError::Corrupt("frame crosses committed end".into())));
                }
                Some(Ok(entry))
            }
            Err(e) => {
                self.pos = self.header.length;
                Some(Err(e))
            }
        }
    }
}
