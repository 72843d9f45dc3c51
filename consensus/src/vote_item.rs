//! Items under reconciliation and the status updates they emit.
//!
//! Two variants exist today: candidate blocks (ordered by cumulative work)
//! and candidate stake-proofs (ordered by score). Both expose a stable
//! identifier and a poll-order rank through [`PollItem`].

use graupel_types::{ItemId, PublicKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Status changes reported for an item under reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteStatus {
    /// The rejection finalized. Terminal.
    Invalid,
    /// The preference flipped to reject.
    Rejected,
    /// The preference flipped to accept.
    Accepted,
    /// The acceptance finalized. Terminal.
    Finalized,
    /// Dropped without converging. Terminal.
    Stale,
}

/// A candidate block under reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: ItemId,
    pub parent: ItemId,
    /// Cumulative chain work; higher-work candidates are polled first.
    pub work: u128,
}

/// A candidate stake-proof under reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRef {
    pub id: ItemId,
    /// Precedence between proofs staking the same UTXO.
    pub sequence: u64,
    /// Staked score; higher-score candidates are polled first.
    pub score: u32,
    /// The UTXO backing this proof's stake.
    pub stake_utxo: ItemId,
    /// Height at which the stake UTXO was created.
    pub stake_height: u32,
    /// The proof master public key.
    pub master: PublicKey,
    /// Expiration timestamp (median chain time); 0 means never.
    pub expiration: i64,
}

/// The capability every reconcilable variant exposes to the registry: a
/// stable identifier and a total poll order.
pub trait PollItem: Clone {
    fn item_id(&self) -> ItemId;

    /// Poll-order rank; higher ranks are polled first.
    fn poll_rank(&self) -> u128;

    /// Canonical poll order: descending rank, tie-broken by id.
    fn poll_cmp(&self, other: &Self) -> Ordering {
        other
            .poll_rank()
            .cmp(&self.poll_rank())
            .then_with(|| self.item_id().cmp(&other.item_id()))
    }
}

impl PollItem for BlockRef {
    fn item_id(&self) -> ItemId {
        self.hash
    }

    fn poll_rank(&self) -> u128 {
        self.work
    }
}

impl PollItem for ProofRef {
    fn item_id(&self) -> ItemId {
        self.id
    }

    fn poll_rank(&self) -> u128 {
        u128::from(self.score)
    }
}

/// A status update for a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockUpdate {
    pub item: BlockRef,
    pub status: VoteStatus,
}

/// A status update for a proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofUpdate {
    pub item: ProofRef,
    pub status: VoteStatus,
}

/// Chain context consulted for block candidacy.
///
/// Implemented by the owner of the block index; the processor only reads
/// through it and reports finalization outcomes back.
pub trait ChainView: Send + Sync {
    /// Whether the block is still a candidate worth polling (valid, not
    /// superseded by a finalized chain).
    fn is_worth_polling(&self, block: &BlockRef) -> bool;

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    fn is_ancestor(&self, ancestor: &ItemId, descendant: &ItemId) -> bool;

    /// Called once when a block's acceptance finalizes.
    fn on_block_finalized(&self, _block: &BlockRef) {}

    /// Called once when a block's rejection finalizes.
    fn on_block_invalidated(&self, _block: &BlockRef) {}
}
