//! Fundamental types for the graupel protocol.
//!
//! This crate defines the core types shared across the workspace: item
//! identifiers, coin amounts, and key material.

pub mod amount;
pub mod error;
pub mod hash;
pub mod keys;

pub use amount::Amount;
pub use error::TypesError;
pub use hash::ItemId;
pub use keys::{KeyPair, PrivateKey, PublicKey};
