//! Error type shared by the types crate's parsing and validation paths.

use thiserror::Error;

/// Failures when constructing core types from external input (hex strings
/// from config or logs, decimal coin amounts).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex digit in {0:?}")]
    InvalidHex(String),

    #[error("expected {expected} hex characters, got {got}")]
    InvalidHexLength { expected: usize, got: usize },

    #[error("malformed coin amount {0:?}")]
    InvalidAmount(String),

    #[error("coin amount {0:?} exceeds the money range")]
    AmountOutOfRange(String),
}
