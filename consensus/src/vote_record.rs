//! Per-item confidence state machine.
//!
//! Each item under reconciliation carries a [`VoteRecord`] that folds a
//! stream of peer votes into a preference (accept or reject) plus a
//! confidence counter. A sliding window of the last 8 votes decides each
//! round: 7 or more agreeing considered votes make the round conclusive.
//! Conclusive rounds that agree with the current preference raise the
//! confidence; a conclusive supermajority on the other side flips the
//! preference and resets it. Reaching [`FINALIZATION_SCORE`] agreeing
//! rounds makes the record terminal.

use crate::message::{VOTE_ACCEPT, VOTE_REJECT};
use crate::peer_manager::PeerId;

/// Confidence at which a record becomes terminal (finalized or invalid).
pub const FINALIZATION_SCORE: u16 = 128;

/// Maximum outstanding polls per item, and per peer.
pub const MAX_INFLIGHT_POLL: u8 = 10;

/// Default number of filtered votes before a record may go stale.
pub const STALE_VOTE_THRESHOLD: u32 = 4096;

/// Lowest configurable stale vote threshold.
pub const STALE_VOTE_MIN_THRESHOLD: u32 = 8;

/// Default scaling factor applied to the confidence when computing the
/// staleness bound.
pub const STALE_VOTE_FACTOR: u32 = 2;

/// Number of recent voters remembered for the diversity filter.
const NODE_FILTER_SLOTS: usize = 8;

/// Filter slot value meaning "no voter recorded yet".
const EMPTY_SLOT: PeerId = PeerId::MAX;

/// Voting state for a single item under reconciliation.
#[derive(Clone, Debug)]
pub struct VoteRecord {
    /// Bit 0 is the current preference (1 = accept); the upper bits count
    /// consecutive agreeing conclusive rounds.
    confidence: u16,
    /// Sliding window of the last 8 vote results (1 = accept).
    votes: u8,
    /// Which window bits carry an opinion at all.
    consider: u8,
    /// Outstanding polls that include this item.
    inflight: u8,
    /// Votes that passed the diversity filter since creation.
    successful_votes: u32,
    /// The last [`NODE_FILTER_SLOTS`] voters, for the diversity filter.
    node_filter: [PeerId; NODE_FILTER_SLOTS],
}

impl VoteRecord {
    /// Create a record with the given initial preference.
    pub fn new(accepted: bool) -> Self {
        Self {
            confidence: u16::from(accepted),
            votes: 0,
            consider: 0,
            inflight: 0,
            successful_votes: 0,
            node_filter: [EMPTY_SLOT; NODE_FILTER_SLOTS],
        }
    }

    /// Current preference.
    pub fn is_accepted(&self) -> bool {
        self.confidence & 0x01 == 1
    }

    /// Confidence counter (consecutive agreeing conclusive rounds).
    pub fn confidence(&self) -> u16 {
        self.confidence >> 1
    }

    /// Whether the record reached its terminal state.
    pub fn has_finalized(&self) -> bool {
        self.confidence() >= FINALIZATION_SCORE
    }

    /// Fold one vote into the record.
    ///
    /// Returns `true` exactly when the record changed state: the preference
    /// flipped, or the confidence just reached [`FINALIZATION_SCORE`].
    /// Votes from a peer that already contributed within the last
    /// [`NODE_FILTER_SLOTS`] accepted votes are discarded.
    pub fn register_vote(&mut self, peer: PeerId, outcome: i32) -> bool {
        if !self.add_peer_to_quorum(peer) {
            return false;
        }

        // Outcomes other than accept/reject carry no opinion.
        let considered = outcome == VOTE_ACCEPT || outcome == VOTE_REJECT;
        self.votes = (self.votes << 1) | u8::from(outcome == VOTE_ACCEPT);
        self.consider = (self.consider << 1) | u8::from(considered);

        let yes = (self.votes & self.consider).count_ones() > 6;
        if !yes {
            let no = (!self.votes & self.consider).count_ones() > 6;
            if !no {
                // Inconclusive round.
                return false;
            }
        }

        if self.is_accepted() == yes {
            self.confidence += 2;
            return self.confidence() == FINALIZATION_SCORE;
        }

        // Conclusive supermajority on the other side: flip and reset.
        self.confidence = u16::from(yes);
        true
    }

    /// Whether the record has not converged within its vote budget.
    ///
    /// The budget scales with the confidence so that records making
    /// progress are given more time than records drowning in neutrals.
    pub fn is_stale(&self, threshold: u32, factor: u32) -> bool {
        self.successful_votes > threshold
            && self.successful_votes > factor.saturating_mul(u32::from(self.confidence()))
    }

    /// Whether another poll may include this item.
    pub fn should_poll(&self) -> bool {
        self.inflight < MAX_INFLIGHT_POLL
    }

    /// Account for an outgoing poll. Returns `false` at the in-flight cap.
    pub fn register_poll(&mut self) -> bool {
        if self.inflight >= MAX_INFLIGHT_POLL {
            return false;
        }
        self.inflight += 1;
        true
    }

    /// Account for a poll that resolved (response or timeout).
    pub fn clear_inflight(&mut self) {
        self.inflight = self.inflight.saturating_sub(1);
    }

    /// Outstanding polls including this item.
    pub fn inflight(&self) -> u8 {
        self.inflight
    }

    /// Votes that passed the diversity filter.
    pub fn successful_votes(&self) -> u32 {
        self.successful_votes
    }

    /// Record the voter, unless it already voted within the current window.
    ///
    /// The slot about to be overwritten (the oldest) is excluded from the
    /// check, so a set of [`NODE_FILTER_SLOTS`] rotating peers always
    /// passes.
    fn add_peer_to_quorum(&mut self, peer: PeerId) -> bool {
        let slots = self.node_filter.len();
        let base = self.successful_votes as usize;
        for i in 1..slots {
            if self.node_filter[(base + i) % slots] == peer {
                return false;
            }
        }
        self.node_filter[base % slots] = peer;
        self.successful_votes += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::VOTE_UNKNOWN;

    /// Feed one vote per call, rotating through 8 distinct peers so the
    /// diversity filter never interferes.
    struct Voter {
        next_peer: PeerId,
    }

    impl Voter {
        fn new() -> Self {
            Self { next_peer: 0 }
        }

        fn vote(&mut self, record: &mut VoteRecord, outcome: i32) -> bool {
            let peer = self.next_peer % 8;
            self.next_peer += 1;
            record.register_vote(peer, outcome)
        }

        fn vote_n(&mut self, record: &mut VoteRecord, outcome: i32, n: usize) -> u32 {
            let mut state_changes = 0;
            for _ in 0..n {
                if self.vote(record, outcome) {
                    state_changes += 1;
                }
            }
            state_changes
        }
    }

    #[test]
    fn new_record_reflects_initial_preference() {
        assert!(VoteRecord::new(true).is_accepted());
        assert!(!VoteRecord::new(false).is_accepted());
        assert_eq!(VoteRecord::new(true).confidence(), 0);
    }

    #[test]
    fn six_agreeing_votes_leave_confidence_at_zero() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();
        for _ in 0..6 {
            assert!(!voter.vote(&mut record, VOTE_ACCEPT));
            assert_eq!(record.confidence(), 0);
            assert!(record.is_accepted());
        }
    }

    #[test]
    fn seventh_agreeing_vote_starts_confidence() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();
        voter.vote_n(&mut record, VOTE_ACCEPT, 6);
        assert!(!voter.vote(&mut record, VOTE_ACCEPT));
        assert_eq!(record.confidence(), 1);
    }

    #[test]
    fn confidence_grows_one_per_agreeing_vote() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();
        for i in 1..=20u16 {
            voter.vote(&mut record, VOTE_ACCEPT);
            let expected = i.saturating_sub(6);
            assert_eq!(record.confidence(), expected);
        }
    }

    /// 6 accepts, 1 neutral, 6 accepts: confidence 6 with one hole still
    /// inside the vote window.
    fn record_at_confidence_six(voter: &mut Voter) -> VoteRecord {
        let mut record = VoteRecord::new(true);
        voter.vote_n(&mut record, VOTE_ACCEPT, 6);
        voter.vote(&mut record, VOTE_UNKNOWN);
        voter.vote_n(&mut record, VOTE_ACCEPT, 6);
        assert_eq!(record.confidence(), 6);
        record
    }

    #[test]
    fn single_neutral_does_not_reset_confidence() {
        let mut voter = Voter::new();
        let mut record = record_at_confidence_six(&mut voter);

        assert!(!voter.vote(&mut record, VOTE_UNKNOWN));
        assert_eq!(record.confidence(), 6);
        assert!(record.is_accepted());
    }

    #[test]
    fn two_neutrals_stall_progress_while_in_window() {
        let mut voter = Voter::new();
        let mut record = record_at_confidence_six(&mut voter);

        voter.vote_n(&mut record, VOTE_UNKNOWN, 2);
        assert_eq!(record.confidence(), 6);

        // The two holes keep every round inconclusive until they leave the
        // 8-vote window.
        for _ in 0..6 {
            assert!(!voter.vote(&mut record, VOTE_ACCEPT));
            assert_eq!(record.confidence(), 6);
        }

        // Window is clean again: progress resumes.
        assert!(!voter.vote(&mut record, VOTE_ACCEPT));
        assert_eq!(record.confidence(), 7);
    }

    #[test]
    fn seven_contrary_votes_flip_the_preference() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();
        voter.vote_n(&mut record, VOTE_ACCEPT, 6);

        for _ in 0..6 {
            assert!(!voter.vote(&mut record, VOTE_REJECT));
            assert!(record.is_accepted());
        }
        assert!(voter.vote(&mut record, VOTE_REJECT));
        assert!(!record.is_accepted());
        assert_eq!(record.confidence(), 0);
    }

    #[test]
    fn finalizes_after_reaching_the_score() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();

        // Confidence reaches k - 6 after k agreeing votes; the vote moving
        // it to the finalization score reports the state change.
        let votes_to_finalize = usize::from(FINALIZATION_SCORE) + 6;
        for i in 1..votes_to_finalize {
            assert!(!voter.vote(&mut record, VOTE_ACCEPT), "vote {i}");
        }
        assert!(voter.vote(&mut record, VOTE_ACCEPT));
        assert!(record.has_finalized());
        assert!(record.is_accepted());

        // Further agreeing votes report no change.
        assert!(!voter.vote(&mut record, VOTE_ACCEPT));
    }

    #[test]
    fn rejection_finalizes_symmetrically() {
        let mut record = VoteRecord::new(false);
        let mut voter = Voter::new();
        let votes_to_finalize = usize::from(FINALIZATION_SCORE) + 6;
        for _ in 1..votes_to_finalize {
            voter.vote(&mut record, VOTE_REJECT);
        }
        assert!(voter.vote(&mut record, VOTE_REJECT));
        assert!(record.has_finalized());
        assert!(!record.is_accepted());
    }

    #[test]
    fn out_of_range_outcomes_are_not_considered() {
        let mut voter = Voter::new();
        let mut record = record_at_confidence_six(&mut voter);

        // Reserved outcome values behave exactly like unknown.
        assert!(!voter.vote(&mut record, 7));
        assert_eq!(record.confidence(), 6);
        assert!(!voter.vote(&mut record, -5));
        assert_eq!(record.confidence(), 6);
    }

    #[test]
    fn repeating_peer_is_filtered() {
        let mut record = VoteRecord::new(true);
        for _ in 0..12 {
            record.register_vote(1, VOTE_ACCEPT);
        }
        // Only the first vote passed the filter.
        assert_eq!(record.successful_votes(), 1);
        assert_eq!(record.confidence(), 0);
    }

    #[test]
    fn eight_rotating_peers_always_pass_the_filter() {
        let mut record = VoteRecord::new(true);
        for i in 0..32u64 {
            record.register_vote(i % 8, VOTE_ACCEPT);
        }
        assert_eq!(record.successful_votes(), 32);
        assert_eq!(record.confidence(), 32 - 6);
    }

    #[test]
    fn stale_on_fresh_record_after_threshold_votes() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();

        // With threshold 8 the ninth filtered vote crosses the budget.
        voter.vote_n(&mut record, VOTE_UNKNOWN, 8);
        assert!(!record.is_stale(STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_FACTOR));
        voter.vote(&mut record, VOTE_UNKNOWN);
        assert!(record.is_stale(STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_FACTOR));
    }

    #[test]
    fn confidence_extends_the_stale_budget() {
        let mut record = VoteRecord::new(true);
        let mut voter = Voter::new();

        // 132 agreeing votes put the confidence at 126; the first trailing
        // neutral still closes a conclusive window and nudges it to 127.
        voter.vote_n(&mut record, VOTE_ACCEPT, 132);
        assert_eq!(record.confidence(), 126);

        // 254 total votes: not yet over 2 * 127.
        voter.vote_n(&mut record, VOTE_UNKNOWN, 122);
        assert_eq!(record.confidence(), 127);
        assert!(!record.is_stale(STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_FACTOR));

        // 255 total votes crosses the budget.
        voter.vote(&mut record, VOTE_UNKNOWN);
        assert!(record.is_stale(STALE_VOTE_MIN_THRESHOLD, STALE_VOTE_FACTOR));
    }

    #[test]
    fn inflight_is_capped() {
        let mut record = VoteRecord::new(true);
        for _ in 0..MAX_INFLIGHT_POLL {
            assert!(record.should_poll());
            assert!(record.register_poll());
        }
        assert!(!record.should_poll());
        assert!(!record.register_poll());
        assert_eq!(record.inflight(), MAX_INFLIGHT_POLL);

        record.clear_inflight();
        assert!(record.should_poll());
        assert_eq!(record.inflight(), MAX_INFLIGHT_POLL - 1);
    }

    #[test]
    fn clear_inflight_saturates_at_zero() {
        let mut record = VoteRecord::new(true);
        record.clear_inflight();
        assert_eq!(record.inflight(), 0);
    }
}
