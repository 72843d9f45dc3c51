use thiserror::Error;

/// Rejection reasons for an incoming vote response.
///
/// The `Display` output of each variant is the wire-level reject tag sent
/// back to the peer, so the exact strings are part of the protocol.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    /// No pending query matches the (peer, round) pair: wrong peer, wrong
    /// round, or the query was already consumed.
    #[error("unexpected-ava-response")]
    UnexpectedResponse,

    /// The vote count does not match the poll size.
    #[error("invalid-ava-response-size")]
    InvalidResponseSize,

    /// The votes do not match the poll items in order.
    #[error("invalid-ava-response-content")]
    InvalidResponseContent,
}

impl VoteError {
    /// Misbehavior score to report for the sending peer.
    ///
    /// An unexpected response can be honest protocol skew (late reply after
    /// a timeout) and is not penalized.
    pub fn banscore(&self) -> u32 {
        match self {
            Self::UnexpectedResponse => 0,
            Self::InvalidResponseSize | Self::InvalidResponseContent => 10,
        }
    }
}

/// Configuration validation failures. Fatal at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("minimum quorum stake {0} is out of range")]
    StakeOutOfRange(u64),

    #[error("minimum quorum connected stake ratio {0} must be between 0 and 1")]
    RatioOutOfRange(f64),

    #[error("stale vote threshold {0} must be at least {1}")]
    StaleThresholdTooLow(u32, u32),

    #[error("stale vote factor must be at least 1")]
    StaleFactorTooLow,

    #[error("stake UTXO confirmations must be at least 1")]
    ConfirmationsTooLow,

    #[error("local proof and local master key must be supplied together")]
    IncompleteLocalProof,

    #[error("local master key does not match the local proof master")]
    MasterKeyMismatch,

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
