//! Master key material for the node's own stake-proof.
//!
//! A proof names its master by public key. A node that supplies its own
//! proof must also hold the matching secret; the processor checks the
//! pairing at construction time and otherwise never touches key material.
//! Signing and key derivation live in the proof layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TypesError;
use crate::hash::parse_hex_32;

/// The public half of a proof master key, as embedded in proofs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

/// The secret half of a proof master key.
///
/// Deliberately opaque: no `Debug`, no `Clone`, no serde, and the bytes
/// are wiped on drop, so the secret cannot leak through logs, copies, or
/// config dumps.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; 32]);

/// A master key pair handed over alongside the local proof.
///
/// The processor only ever asks one question of it: does the public half
/// match the master the proof declares?
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl PublicKey {
    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        parse_hex_32(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PrivateKey {
    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        parse_hex_32(s).map(Self)
    }
}

impl KeyPair {
    /// Whether this key pair is the key for the given proof master.
    pub fn pairs_with(&self, master: &PublicKey) -> bool {
        self.public == *master
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, ..] = self.0;
        write!(f, "PublicKey({a:02x}{b:02x}{c:02x}{d:02x}..)")
    }
}
