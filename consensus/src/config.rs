//! Processor configuration with TOML file support.

use serde::{Deserialize, Serialize};

use graupel_types::{Amount, KeyPair};

use crate::error::ConfigError;
use crate::vote_item::ProofRef;
use crate::vote_record::{STALE_VOTE_FACTOR, STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_THRESHOLD};

/// Configuration for a voting [`Processor`](crate::Processor).
///
/// Can be loaded from a TOML file via [`ProcessorConfig::from_toml_file`]
/// or built programmatically (e.g. for tests). The local proof and master
/// key are handed over by the proof layer and never come from TOML.
/// (No `Debug`/`Clone`: the master key must not be copied or printed.)
#[derive(Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Minimum total registered stake before quorum, in raw coin units.
    #[serde(default)]
    pub min_quorum_stake: u64,

    /// Fraction of the minimum quorum score that must be connected.
    #[serde(default)]
    pub min_quorum_connected_stake_ratio: f64,

    /// Distinct peers that must deliver a proof inventory before quorum.
    #[serde(default)]
    pub min_proof_inventories: u64,

    /// How long to wait for a poll response, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Delay between event-loop ticks, in milliseconds.
    #[serde(default = "default_query_interval_ms")]
    pub query_interval_ms: u64,

    /// Votes a record may absorb before it can be declared stale.
    #[serde(default = "default_stale_vote_threshold")]
    pub stale_vote_threshold: u32,

    /// Scaling applied to the confidence when computing the stale budget.
    #[serde(default = "default_stale_vote_factor")]
    pub stale_vote_factor: u32,

    /// Confirmations a stake UTXO needs before its proof matures.
    #[serde(default = "default_stake_utxo_confirmations")]
    pub stake_utxo_confirmations: u32,

    /// This node's own proof, if it stakes.
    #[serde(skip)]
    pub local_proof: Option<ProofRef>,

    /// Master key paired with `local_proof`.
    #[serde(skip)]
    pub local_master_key: Option<KeyPair>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_query_interval_ms() -> u64 {
    10
}

fn default_stale_vote_threshold() -> u32 {
    STALE_VOTE_THRESHOLD
}

fn default_stale_vote_factor() -> u32 {
    STALE_VOTE_FACTOR
}

fn default_stake_utxo_confirmations() -> u32 {
    2016
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ProcessorConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check every recognized option against its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !Amount::new(self.min_quorum_stake).is_in_range() {
            return Err(ConfigError::StakeOutOfRange(self.min_quorum_stake));
        }

        let ratio = self.min_quorum_connected_stake_ratio;
        if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::RatioOutOfRange(ratio));
        }

        if self.stale_vote_threshold < STALE_VOTE_MIN_THRESHOLD {
            return Err(ConfigError::StaleThresholdTooLow(
                self.stale_vote_threshold,
                STALE_VOTE_MIN_THRESHOLD,
            ));
        }

        if self.stale_vote_factor < 1 {
            return Err(ConfigError::StaleFactorTooLow);
        }

        if self.stake_utxo_confirmations < 1 {
            return Err(ConfigError::ConfirmationsTooLow);
        }

        match (&self.local_proof, &self.local_master_key) {
            (None, None) => {}
            (Some(proof), Some(key)) => {
                if !key.pairs_with(&proof.master) {
                    return Err(ConfigError::MasterKeyMismatch);
                }
            }
            _ => return Err(ConfigError::IncompleteLocalProof),
        }

        Ok(())
    }

    /// The score the registered stake must reach for quorum.
    pub fn min_quorum_score(&self) -> u32 {
        Amount::new(self.min_quorum_stake).to_score()
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_quorum_stake: 0,
            min_quorum_connected_stake_ratio: 0.0,
            min_proof_inventories: 0,
            query_timeout_ms: default_query_timeout_ms(),
            query_interval_ms: default_query_interval_ms(),
            stale_vote_threshold: default_stale_vote_threshold(),
            stale_vote_factor: default_stale_vote_factor(),
            stake_utxo_confirmations: default_stake_utxo_confirmations(),
            local_proof: None,
            local_master_key: None,
        }
    }
}
