//! 20-byte node / proposer address

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// Identity of a sequencer node or a block proposer.
///
/// Consensus engines hand proposer addresses over as raw bytes; anything
/// longer than 20 bytes is truncated to its trailing 20 via
/// [`Address::from_proposer_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Size of address in bytes
    pub const LEN: usize = 20;

    /// Zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create address from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Create address from an exact 20-byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != Self::LEN {
            return Err(AddressError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Address(bytes))
    }

    /// Build an address from proposer bytes of any length.
    ///
    /// Short inputs are left-padded with zeros, long inputs keep their
    /// trailing 20 bytes.
    pub fn from_proposer_bytes(raw: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        if raw.len() >= Self::LEN {
            bytes.copy_from_slice(&raw[raw.len() - Self::LEN..]);
        } else {
            bytes[Self::LEN - raw.len()..].copy_from_slice(raw);
        }
        Address(bytes)
    }

    /// Parse from hex (with or without 0x prefix).
    ///
    /// Short values are left-padded, so `0x1234` is a valid address.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let padded;
        let s = if s.len() % 2 == 1 {
            padded = format!("0{}", s);
            padded.as_str()
        } else {
            s
        };
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() > Self::LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        Ok(Self::from_proposer_bytes(&bytes))
    }

    /// Get as byte slice
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_full_hex() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d").unwrap();
        assert!(!addr.is_zero());
        assert_eq!(addr.to_hex(), "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d");
    }

    #[test]
    fn test_address_from_short_hex_is_left_padded() {
        let addr = Address::from_hex("0x1234").unwrap();
        let mut expected = [0u8; 20];
        expected[18] = 0x12;
        expected[19] = 0x34;
        assert_eq!(addr, Address::from_bytes(expected));
    }

    #[test]
    fn test_address_odd_length_hex() {
        let addr = Address::from_hex("abc").unwrap();
        assert_eq!(addr.as_bytes()[18], 0x0a);
        assert_eq!(addr.as_bytes()[19], 0xbc);
    }

    #[test]
    fn test_address_too_long() {
        let hex = format!("0x{}", "11".repeat(21));
        assert_eq!(Address::from_hex(&hex), Err(AddressError::InvalidLength(21)));
    }

    #[test]
    fn test_address_invalid_hex() {
        assert!(matches!(Address::from_hex("0xzz"), Err(AddressError::InvalidHex(_))));
    }

    #[test]
    fn test_from_slice_requires_exact_length() {
        assert!(Address::from_slice(&[1u8; 20]).is_ok());
        assert_eq!(Address::from_slice(&[1u8; 19]), Err(AddressError::InvalidLength(19)));
    }

    #[test]
    fn test_from_proposer_bytes_truncates_long_input() {
        let mut raw = vec![0xffu8; 12];
        raw.extend_from_slice(&[0x01; 20]);
        assert_eq!(Address::from_proposer_bytes(&raw), Address::from_bytes([0x01; 20]));
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(Address::default().is_zero());
        assert!(Address::from_hex("0x00").unwrap().is_zero());
    }

    #[test]
    fn test_parse_via_from_str() {
        let addr: Address = "0x01".parse().unwrap();
        assert_eq!(addr.as_bytes()[19], 1);
        assert_eq!(format!("{}", addr), addr.to_hex());
    }
}
