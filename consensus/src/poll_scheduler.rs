//! Outstanding poll bookkeeping.
//!
//! Tracks every query that has been sent and not yet answered, keyed by
//! `(peer, round)`. The scheduler owns the round counter, enforces the
//! per-peer outstanding cap, and sweeps out queries whose deadline passed.

use crate::message::Inv;
use crate::peer_manager::PeerId;
use crate::vote_record::MAX_INFLIGHT_POLL;
use std::collections::HashMap;
use std::time::Instant;

/// One outstanding poll.
#[derive(Clone, Debug)]
pub struct PendingQuery {
    pub peer: PeerId,
    pub round: u64,
    pub deadline: Instant,
    /// The polled items, in the exact order they were sent.
    pub invs: Vec<Inv>,
}

/// Table of outstanding polls plus the round counter.
#[derive(Debug, Default)]
pub struct PollScheduler {
    queries: HashMap<(PeerId, u64), PendingQuery>,
    outstanding: HashMap<PeerId, u32>,
    round: u64,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The round number the next emitted poll will carry.
    pub fn current_round(&self) -> u64 {
        self.round
    }

    /// Claim the next round number. Each round is used at most once.
    pub fn next_round(&mut self) -> u64 {
        let round = self.round;
        self.round += 1;
        round
    }

    /// Record an emitted poll. Refuses beyond the per-peer cap or when the
    /// `(peer, round)` key is already taken.
    pub fn register_query(
        &mut self,
        peer: PeerId,
        round: u64,
        deadline: Instant,
        invs: Vec<Inv>,
    ) -> bool {
        let count = self.outstanding.entry(peer).or_insert(0);
        if *count >= u32::from(MAX_INFLIGHT_POLL) {
            return false;
        }
        if self.queries.contains_key(&(peer, round)) {
            return false;
        }
        *count += 1;
        self.queries.insert(
            (peer, round),
            PendingQuery {
                peer,
                round,
                deadline,
                invs,
            },
        );
        true
    }

    /// Look at an outstanding query without consuming it.
    pub fn get(&self, peer: PeerId, round: u64) -> Option<&PendingQuery> {
        self.queries.get(&(peer, round))
    }

    /// Consume a query once its response validated.
    pub fn take(&mut self, peer: PeerId, round: u64) -> Option<PendingQuery> {
        let query = self.queries.remove(&(peer, round))?;
        self.decrement(peer);
        Some(query)
    }

    /// Remove every query whose deadline has passed, returning them so the
    /// caller can release in-flight counters and peers.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingQuery> {
        let expired_keys: Vec<(PeerId, u64)> = self
            .queries
            .iter()
            .filter(|(_, query)| query.deadline <= now)
            .map(|(key, _)| *key)
            .collect();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(query) = self.queries.remove(&key) {
                self.decrement(key.0);
                expired.push(query);
            }
        }
        expired
    }

    /// Drop every query addressed to a departing peer.
    pub fn evict_peer(&mut self, peer: PeerId) -> Vec<PendingQuery> {
        let keys: Vec<(PeerId, u64)> = self
            .queries
            .keys()
            .filter(|(query_peer, _)| *query_peer == peer)
            .copied()
            .collect();

        let mut evicted = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(query) = self.queries.remove(&key) {
                evicted.push(query);
            }
        }
        self.outstanding.remove(&peer);
        evicted
    }

    /// Outstanding queries for one peer.
    pub fn outstanding_for(&self, peer: PeerId) -> u32 {
        self.outstanding.get(&peer).copied().unwrap_or(0)
    }

    /// Total outstanding queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn decrement(&mut self, peer: PeerId) {
        if let Some(count) = self.outstanding.get_mut(&peer) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.outstanding.remove(&peer);
            }
        }
    }
}
