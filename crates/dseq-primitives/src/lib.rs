//! # dseq-primitives
//!
//! Primitive types shared by the dseq crates.
//!
//! - [`Address`]: 20-byte sequencer / proposer identity
//! - [`H256`] and [`keccak256`]: transaction content hashes
//! - [`Transaction`]: an opaque byte blob, identified by its content

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{Address, AddressError};
pub use hash::{keccak256, HashError, H256};

/// Opaque transaction payload. No internal structure is assumed.
pub type Transaction = bytes::Bytes;

/// Block height type
pub type BlockHeight = u64;
