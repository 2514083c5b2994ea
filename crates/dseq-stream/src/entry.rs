//! Entry kinds and frame encoding

use crate::error::{StreamError, StreamResult};
use bytes::Bytes;
use std::fmt;
use std::io::Read;

/// Bytes preceding the payload in a frame: kind, number, payload length
pub const FRAME_HEADER_LEN: usize = 1 + 8 + 4;

/// Length of the content digest carried by BlockEnd markers
pub const BLOCK_DIGEST_LEN: usize = 32;

/// BlockEnd payload length: height then content digest
pub const BLOCK_END_MARKER_LEN: usize = 8 + BLOCK_DIGEST_LEN;

/// Kind of a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Opens a block; payload is the block height
    BlockStart = 1,
    /// One transaction; payload is the raw transaction
    Tx = 2,
    /// Closes a block; payload is the block height and its content digest
    BlockEnd = 3,
}

impl EntryType {
    /// Wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human readable name, as printed by the stream reader
    pub fn name(self) -> &'static str {
        match self {
            EntryType::BlockStart => "block start",
            EntryType::Tx => "transaction",
            EntryType::BlockEnd => "block end",
        }
    }
}

impl TryFrom<u8> for EntryType {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EntryType::BlockStart),
            2 => Ok(EntryType::Tx),
            3 => Ok(EntryType::BlockEnd),
            other => Err(StreamError::UnknownEntryType(other)),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric tag identifying an application among others sharing a log server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamType(pub u64);

impl StreamType {
    /// The sequencer's stream
    pub const SEQUENCER: StreamType = StreamType(1);
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record of the entry log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Position in the log, starting at 0
    pub number: u64,
    /// Entry kind
    pub kind: EntryType,
    /// Entry payload
    pub payload: Bytes,
}

impl StreamEntry {
    /// Create an entry
    pub fn new(number: u64, kind: EntryType, payload: impl Into<Bytes>) -> Self {
        Self {
            number,
            kind,
            payload: payload.into(),
        }
    }

    /// Encoded frame length
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Encode as `kind | number | len | payload`, all integers big-endian
    pub fn encode(&self) -> StreamResult<Vec<u8>> {
        let len = u32::try_from(self.payload.len())
            .map_err(|_| StreamError::PayloadTooLarge(self.payload.len()))?;
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.kind.as_u8());
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decode one frame from `reader`
    pub fn decode_from<R: Read>(reader: &mut R) -> StreamResult<Self> {
        Self::decode_within(reader, usize::MAX)
    }

    /// Decode one frame whose payload may not exceed `limit` bytes.
    ///
    /// The length field is checked before the payload buffer is allocated.
    pub fn decode_within<R: Read>(reader: &mut R, limit: usize) -> StreamResult<Self> {
        let mut head = [0u8; FRAME_HEADER_LEN];
        reader.read_exact(&mut head)?;

        let kind = EntryType::try_from(head[0])?;
        let mut number = [0u8; 8];
        number.copy_from_slice(&head[1..9]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&head[9..13]);

        let len = u32::from_be_bytes(len) as usize;
        if len > limit {
            return Err(StreamError::Corrupt(format!(
                "frame payload of {} bytes exceeds the {} bytes left",
                len, limit
            )));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;

        Ok(Self {
            number: u64::from_be_bytes(number),
            kind,
            payload: Bytes::from(payload),
        })
    }
}

/// Payload of BlockStart / BlockEnd entries: the height as 8-byte big-endian
pub fn block_marker(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// BlockEnd payload: the height as 8-byte big-endian, then the block digest
pub fn block_end_marker(height: u64, digest: &[u8; BLOCK_DIGEST_LEN]) -> [u8; BLOCK_END_MARKER_LEN] {
    let mut marker = [0u8; BLOCK_END_MARKER_LEN];
    marker[..8].copy_from_slice(&height.to_be_bytes());
    marker[8..].copy_from_slice(digest);
    marker
}

/// Height carried by a block marker payload, if well formed
pub fn marker_height(payload: &[u8]) -> Option<u64> {
    if payload.len() != 8 && payload.len() != BLOCK_END_MARKER_LEN {
        return None;
    }
    let bytes: [u8; 8] = payload[..8].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// The last block sealed in a log, as recorded by its BlockEnd entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedBlock {
    /// Block height
    pub height: u64,
    /// Content digest of the block's transactions; zero for a bare height marker
    pub digest: [u8; BLOCK_DIGEST_LEN],
}

impl LoggedBlock {
    /// Parse a BlockEnd payload
    pub fn from_marker(payload: &[u8]) -> Option<Self> {
        let height = marker_height(payload)?;
        let mut digest = [0u8; BLOCK_DIGEST_LEN];
        if payload.len() == BLOCK_END_MARKER_LEN {
            digest.copy_from_slice(&payload[8..]);
        }
        Some(Self { height, digest })
    }
}
