//! Identifier type for vote items.
//!
//! Every item under reconciliation — block or proof — is addressed by a
//! 256-bit id. Ids are ordered (bytewise) because the poll order breaks
//! rank ties by id, and they parse from hex because that is how they
//! arrive in config files and diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// A 256-bit vote item identifier (block hash or proof id).
///
/// The `Ord` impl is part of the contract: registries use it to break
/// poll-rank ties deterministically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId([u8; 32]);

impl ItemId {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        parse_hex_32(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl FromStr for ItemId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Log lines only need enough of the id to tell items apart.
        let [a, b, c, d, ..] = self.0;
        write!(f, "ItemId({a:02x}{b:02x}{c:02x}{d:02x}..)")
    }
}

/// Decode exactly 32 bytes of lowercase or uppercase hex.
pub(crate) fn parse_hex_32(s: &str) -> Result<[u8; 32], TypesError> {
    if s.len() != 64 {
        return Err(TypesError::InvalidHexLength {
            expected: 64,
            got: s.len(),
        });
    }

    let mut bytes = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
        let high = hex_digit(chunk[0]);
        let low = hex_digit(chunk[1]);
        match (high, low) {
            (Some(high), Some(low)) => bytes[i] = (high << 4) | low,
            _ => return Err(TypesError::InvalidHex(s.to_string())),
        }
    }
    Ok(bytes)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
