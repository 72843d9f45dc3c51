//! Wire structures exchanged during a poll round.
//!
//! A poll carries an ordered list of inventory entries; the response must
//! echo one vote per entry, in the same order.

use graupel_types::ItemId;
use serde::{Deserialize, Serialize};

/// Vote outcome: the peer accepts the item.
pub const VOTE_ACCEPT: i32 = 0;
/// Vote outcome: the peer rejects the item.
pub const VOTE_REJECT: i32 = 1;
/// Vote outcome: the peer has no opinion (does not know the item yet).
pub const VOTE_UNKNOWN: i32 = -1;

/// The kind of item an inventory entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvKind {
    Block,
    Proof,
}

/// One inventory entry of an outgoing poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inv {
    pub kind: InvKind,
    pub id: ItemId,
}

impl Inv {
    pub fn block(id: ItemId) -> Self {
        Self {
            kind: InvKind::Block,
            id,
        }
    }

    pub fn proof(id: ItemId) -> Self {
        Self {
            kind: InvKind::Proof,
            id,
        }
    }
}

/// An outgoing poll: a round number plus 1..=16 inventory entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Poll {
    pub round: u64,
    pub invs: Vec<Inv>,
}

/// A single vote inside a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// `0` accept, `1` reject, `-1` unknown; other values are reserved and
    /// treated as unknown.
    pub outcome: i32,
    pub id: ItemId,
}

impl Vote {
    pub fn new(outcome: i32, id: ItemId) -> Self {
        Self { outcome, id }
    }
}

/// A peer's reply to a poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Round number of the poll being answered.
    pub round: u64,
    /// Minimum delay before this peer wants to be polled again.
    pub cooldown_ms: u32,
    /// One vote per poll entry, order preserving.
    pub votes: Vec<Vote>,
}

impl Response {
    pub fn new(round: u64, cooldown_ms: u32, votes: Vec<Vote>) -> Self {
        Self {
            round,
            cooldown_ms,
            votes,
        }
    }
}
