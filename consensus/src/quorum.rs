//! Quorum readiness gate.
//!
//! Votes are meaningless until the connected, staked peer set is rich
//! enough. Three legs must hold at the same time: enough total stake
//! registered, enough of the minimum stake connected, and enough distinct
//! peers having delivered their initial proof inventory. Once all three
//! have held, the gate latches and stays established for the processor's
//! lifetime.

use crate::peer_manager::PeerId;
use std::collections::HashSet;
use tracing::info;

/// Latching three-legged readiness check.
#[derive(Debug)]
pub struct QuorumGate {
    min_score: u32,
    connected_ratio: f64,
    min_proof_inventories: u64,
    /// Peers that delivered their initial proof inventory.
    inventory_peers: HashSet<PeerId>,
    latched: bool,
}

impl QuorumGate {
    pub fn new(min_score: u32, connected_ratio: f64, min_proof_inventories: u64) -> Self {
        Self {
            min_score,
            connected_ratio,
            min_proof_inventories,
            inventory_peers: HashSet::new(),
            latched: false,
        }
    }

    /// Count a peer's initial proof inventory. Repeats from the same peer
    /// are ignored. Returns whether the peer was newly counted.
    pub fn record_proof_inventory(&mut self, peer: PeerId) -> bool {
        self.inventory_peers.insert(peer)
    }

    /// Distinct peers counted so far.
    pub fn inventory_count(&self) -> u64 {
        self.inventory_peers.len() as u64
    }

    /// The connected score required by the ratio leg.
    pub fn min_connected_score(&self) -> u32 {
        (f64::from(self.min_score) * self.connected_ratio).round() as u32
    }

    /// Evaluate the gate against the current score aggregates, latching on
    /// success.
    pub fn is_established(&mut self, total_score: u64, connected_score: u64) -> bool {
        if self.latched {
            return true;
        }

        if self.inventory_count() < self.min_proof_inventories {
            return false;
        }
        if total_score < u64::from(self.min_score) {
            return false;
        }
        if connected_score < u64::from(self.min_connected_score()) {
            return false;
        }

        info!(
            total_score,
            connected_score,
            inventories = self.inventory_count(),
            "quorum established"
        );
        self.latched = true;
        true
    }
}
