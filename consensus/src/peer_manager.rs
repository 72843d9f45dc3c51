//! Peer and proof registry backing the voting processor.
//!
//! Peers only matter to the poller once they back a registered stake-proof.
//! Proofs live in one of three pools:
//!
//! - **Bound** — the proof owns its stake UTXO and counts toward quorum.
//! - **Conflicting** — another proof with higher sequence owns the UTXO.
//! - **Immature** — the stake UTXO lacks the required confirmation depth.
//!
//! The manager also tracks per-peer availability for the scheduler: a peer
//! holding an outstanding query, or still inside its response cooldown, is
//! not eligible for selection.

use crate::vote_item::ProofRef;
use graupel_types::ItemId;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Identifier of a connected peer.
pub type PeerId = u64;

/// Which pool a registered proof currently sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProofPool {
    Bound,
    Conflicting,
    Immature,
}

#[derive(Clone, Debug)]
struct ProofEntry {
    proof: ProofRef,
    pool: ProofPool,
    finalized: bool,
}

#[derive(Clone, Debug)]
struct Node {
    proof_id: ItemId,
    /// Earliest instant the peer may be polled again (response cooldown).
    next_request_at: Instant,
    /// Whether the peer currently holds an outstanding query.
    busy: bool,
}

/// Registry of avalanche peers and their stake-proofs.
#[derive(Debug)]
pub struct PeerManager {
    nodes: HashMap<PeerId, Node>,
    proofs: HashMap<ItemId, ProofEntry>,
    /// Stake UTXO -> id of the proof currently bound to it.
    bound_by_utxo: HashMap<ItemId, ItemId>,
    tip_height: u32,
    stake_utxo_confirmations: u32,
}

impl PeerManager {
    pub fn new(stake_utxo_confirmations: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            proofs: HashMap::new(),
            bound_by_utxo: HashMap::new(),
            tip_height: 0,
            stake_utxo_confirmations,
        }
    }

    // -- Proof registration ------------------------------------------------

    /// Register a proof, classifying it into a pool.
    ///
    /// Returns `true` when the proof landed in the bound or conflicting
    /// pool, `false` for duplicates and immature proofs.
    pub fn register_proof(&mut self, proof: ProofRef) -> bool {
        if self.proofs.contains_key(&proof.id) {
            return false;
        }

        if self.is_immature_height(proof.stake_height) {
            debug!(proof = %proof.id, "proof stake is immature");
            self.proofs.insert(
                proof.id,
                ProofEntry {
                    proof,
                    pool: ProofPool::Immature,
                    finalized: false,
                },
            );
            return false;
        }

        self.bind_or_conflict(proof);
        true
    }

    /// Whether the proof is registered in any pool.
    pub fn exists(&self, proof_id: &ItemId) -> bool {
        self.proofs.contains_key(proof_id)
    }

    pub fn is_bound_to_peer(&self, proof_id: &ItemId) -> bool {
        self.pool_of(proof_id) == Some(ProofPool::Bound)
    }

    pub fn is_in_conflicting_pool(&self, proof_id: &ItemId) -> bool {
        self.pool_of(proof_id) == Some(ProofPool::Conflicting)
    }

    pub fn is_immature(&self, proof_id: &ItemId) -> bool {
        self.pool_of(proof_id) == Some(ProofPool::Immature)
    }

    /// Mark a proof whose acceptance finalized.
    pub fn on_proof_finalized(&mut self, proof_id: &ItemId) {
        if let Some(entry) = self.proofs.get_mut(proof_id) {
            entry.finalized = true;
        }
    }

    pub fn is_proof_finalized(&self, proof_id: &ItemId) -> bool {
        self.proofs
            .get(proof_id)
            .map(|entry| entry.finalized)
            .unwrap_or(false)
    }

    /// Drop a proof whose rejection finalized. Detaches and returns the
    /// peers that were backing it; a conflicting proof on the same UTXO is
    /// promoted in its place.
    pub fn reject_proof(&mut self, proof_id: &ItemId) -> Vec<PeerId> {
        let Some(entry) = self.proofs.remove(proof_id) else {
            return Vec::new();
        };

        if entry.pool == ProofPool::Bound {
            self.bound_by_utxo.remove(&entry.proof.stake_utxo);
            self.promote_conflicting(&entry.proof.stake_utxo);
        }

        let detached: Vec<PeerId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.proof_id == *proof_id)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in &detached {
            self.nodes.remove(peer);
        }
        detached
    }

    /// Update the chain tip: matures immature proofs and drops expired
    /// ones. Returns the peers detached by expiry.
    pub fn update_chain_tip(&mut self, height: u32, median_time: i64) -> Vec<PeerId> {
        self.tip_height = height;

        let matured: Vec<ItemId> = self
            .proofs
            .iter()
            .filter(|(_, entry)| {
                entry.pool == ProofPool::Immature
                    && !self.is_immature_height(entry.proof.stake_height)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in matured {
            if let Some(entry) = self.proofs.remove(&id) {
                self.bind_or_conflict(entry.proof);
            }
        }

        let expired: Vec<ItemId> = self
            .proofs
            .iter()
            .filter(|(_, entry)| {
                entry.proof.expiration != 0 && entry.proof.expiration <= median_time
            })
            .map(|(id, _)| *id)
            .collect();
        let mut detached = Vec::new();
        for id in expired {
            debug!(proof = %id, "proof expired");
            detached.extend(self.reject_proof(&id));
        }
        detached
    }

    // -- Nodes -------------------------------------------------------------

    /// Attach a peer to a bound proof. A peer already known is re-bound.
    pub fn add_node(&mut self, peer: PeerId, proof_id: ItemId) -> bool {
        if !self.is_bound_to_peer(&proof_id) {
            return false;
        }
        self.nodes.insert(
            peer,
            Node {
                proof_id,
                next_request_at: Instant::now(),
                busy: false,
            },
        );
        true
    }

    pub fn remove_node(&mut self, peer: PeerId) -> bool {
        self.nodes.remove(&peer).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether any connected peer backs this proof.
    pub fn has_node_attached(&self, proof_id: &ItemId) -> bool {
        self.nodes.values().any(|node| node.proof_id == *proof_id)
    }

    /// Pick a peer eligible to be queried, uniformly at random.
    ///
    /// Eligible means: backing a bound proof, no outstanding query, and
    /// past its response cooldown.
    pub fn select_node(&self, now: Instant) -> Option<PeerId> {
        let eligible: Vec<PeerId> = self
            .nodes
            .iter()
            .filter(|(_, node)| {
                !node.busy
                    && node.next_request_at <= now
                    && self.is_bound_to_peer(&node.proof_id)
            })
            .map(|(peer, _)| *peer)
            .collect();
        eligible.choose(&mut rand::thread_rng()).copied()
    }

    /// Mark a peer as holding an outstanding query.
    pub fn mark_busy(&mut self, peer: PeerId) {
        if let Some(node) = self.nodes.get_mut(&peer) {
            node.busy = true;
        }
    }

    /// Mark a peer available again (response, timeout, or disconnect).
    pub fn clear_busy(&mut self, peer: PeerId) {
        if let Some(node) = self.nodes.get_mut(&peer) {
            node.busy = false;
        }
    }

    /// Apply a response cooldown: the peer will not be selected before it
    /// elapses.
    pub fn set_cooldown(&mut self, peer: PeerId, cooldown: Duration) {
        if let Some(node) = self.nodes.get_mut(&peer) {
            node.next_request_at = Instant::now() + cooldown;
        }
    }

    // -- Scores ------------------------------------------------------------

    /// Total score of all bound proofs.
    pub fn total_peers_score(&self) -> u64 {
        self.proofs
            .values()
            .filter(|entry| entry.pool == ProofPool::Bound)
            .map(|entry| u64::from(entry.proof.score))
            .sum()
    }

    /// Score of bound proofs with at least one peer attached.
    pub fn connected_peers_score(&self) -> u64 {
        self.proofs
            .values()
            .filter(|entry| entry.pool == ProofPool::Bound && self.has_node_attached(&entry.proof.id))
            .map(|entry| u64::from(entry.proof.score))
            .sum()
    }

    // -- Internals ---------------------------------------------------------

    fn pool_of(&self, proof_id: &ItemId) -> Option<ProofPool> {
        self.proofs.get(proof_id).map(|entry| entry.pool)
    }

    fn is_immature_height(&self, stake_height: u32) -> bool {
        u64::from(stake_height) + u64::from(self.stake_utxo_confirmations)
            > u64::from(self.tip_height) + 1
    }

    /// Bind the proof to its stake UTXO, demoting a lower-sequence
    /// incumbent to the conflicting pool.
    fn bind_or_conflict(&mut self, proof: ProofRef) {
        let pool = match self.bound_by_utxo.get(&proof.stake_utxo).copied() {
            Some(incumbent_id) => {
                let incumbent_sequence = self
                    .proofs
                    .get(&incumbent_id)
                    .map(|entry| entry.proof.sequence)
                    .unwrap_or(0);
                if proof.sequence > incumbent_sequence {
                    if let Some(incumbent) = self.proofs.get_mut(&incumbent_id) {
                        incumbent.pool = ProofPool::Conflicting;
                    }
                    self.bound_by_utxo.insert(proof.stake_utxo, proof.id);
                    ProofPool::Bound
                } else {
                    ProofPool::Conflicting
                }
            }
            None => {
                self.bound_by_utxo.insert(proof.stake_utxo, proof.id);
                ProofPool::Bound
            }
        };

        self.proofs.insert(
            proof.id,
            ProofEntry {
                proof,
                pool,
                finalized: false,
            },
        );
    }

    /// Promote the best conflicting proof for a freed stake UTXO.
    fn promote_conflicting(&mut self, stake_utxo: &ItemId) {
        let best = self
            .proofs
            .values()
            .filter(|entry| {
                entry.pool == ProofPool::Conflicting && entry.proof.stake_utxo == *stake_utxo
            })
            .max_by_key(|entry| (entry.proof.sequence, entry.proof.score))
            .map(|entry| entry.proof.id);
        if let Some(id) = best {
            self.bound_by_utxo.insert(*stake_utxo, id);
            if let Some(entry) = self.proofs.get_mut(&id) {
                entry.pool = ProofPool::Bound;
            }
        }
    }
}
