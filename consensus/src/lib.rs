//! Consensus — avalanche-style finality through repeated peer polling.
//!
//! Competing vote items (candidate blocks and candidate stake-proofs) are
//! reconciled by asking staked peers which side they prefer, over and over,
//! until one side holds a supermajority long enough to finalize. Votes only
//! count once the connected, staked peer set is rich enough to be
//! meaningful.
//!
//! ## Module overview
//!
//! - [`vote_record`] — Per-item confidence state machine.
//! - [`vote_item`] — Block and proof references, status updates, the chain
//!   contract.
//! - [`registry`] — Bounded, ordered set of items under reconciliation.
//! - [`poll_scheduler`] — Outstanding query table, round counter, timeouts.
//! - [`message`] — Poll and response wire structures.
//! - [`peer_manager`] — Staked peers, proof pools, and peer selection.
//! - [`quorum`] — Latching quorum readiness gate.
//! - [`config`] — Configuration and validation.
//! - [`processor`] — Public façade and event loop.
//! - [`error`] — Error types.

pub mod config;
pub mod error;
pub mod message;
pub mod peer_manager;
pub mod poll_scheduler;
pub mod processor;
pub mod quorum;
pub mod registry;
pub mod vote_item;
pub mod vote_record;

pub use config::ProcessorConfig;
pub use error::{ConfigError, VoteError};
pub use message::{Inv, InvKind, Poll, Response, Vote, VOTE_ACCEPT, VOTE_REJECT, VOTE_UNKNOWN};
pub use peer_manager::{PeerId, PeerManager};
pub use poll_scheduler::{PendingQuery, PollScheduler};
pub use processor::{PollTransport, Processor, VoteUpdates};
pub use quorum::QuorumGate;
pub use registry::{Admission, ItemRegistry, MAX_ELEMENT_POLL};
pub use vote_item::{
    BlockRef, BlockUpdate, ChainView, PollItem, ProofRef, ProofUpdate, VoteStatus,
};
pub use vote_record::{
    VoteRecord, FINALIZATION_SCORE, MAX_INFLIGHT_POLL, STALE_VOTE_FACTOR,
    STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_THRESHOLD,
};
