//! The voting processor — public façade and event loop.
//!
//! Wires the per-item vote records, the item registries, the poll
//! scheduler, the peer manager, and the quorum gate behind one API.
//! Callers admit items, feed peer responses in, and receive status
//! updates out; a background task drives the polling.
//!
//! Lock order, outermost first: block registry, proof registry, poll
//! scheduler, peer manager, quorum gate. Every method acquires locks in
//! this order (possibly skipping some); [`Processor::with_peer_manager`]
//! is the only public path to the peer-manager lock.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

use graupel_types::ItemId;

use crate::config::ProcessorConfig;
use crate::error::{ConfigError, VoteError};
use crate::message::{Inv, InvKind, Poll, Response};
use crate::peer_manager::{PeerId, PeerManager};
use crate::poll_scheduler::PollScheduler;
use crate::quorum::QuorumGate;
use crate::registry::{Admission, ItemRegistry, MAX_ELEMENT_POLL};
use crate::vote_item::{
    BlockRef, BlockUpdate, ChainView, ProofRef, ProofUpdate, VoteStatus,
};
use crate::vote_record::VoteRecord;

/// Outbound delivery of polls. Implementations must not block.
pub trait PollTransport: Send + Sync {
    fn send_poll(&self, peer: PeerId, poll: Poll);
}

/// Status updates produced by one accepted response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoteUpdates {
    pub blocks: Vec<BlockUpdate>,
    pub proofs: Vec<ProofUpdate>,
}

impl VoteUpdates {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.proofs.is_empty()
    }
}

/// The avalanche voting processor.
pub struct Processor {
    query_timeout: Duration,
    query_interval: Duration,
    stale_vote_threshold: u32,
    stale_vote_factor: u32,
    local_proof: Option<ProofRef>,
    chain: Arc<dyn ChainView>,
    transport: Arc<dyn PollTransport>,
    blocks: Mutex<ItemRegistry<BlockRef>>,
    proofs: Mutex<ItemRegistry<ProofRef>>,
    scheduler: Mutex<PollScheduler>,
    peers: Mutex<PeerManager>,
    quorum: Mutex<QuorumGate>,
    /// Stop handle of the running event loop, if any.
    event_loop: Mutex<Option<broadcast::Sender<()>>>,
}

impl Processor {
    /// Validate the configuration and build a processor.
    ///
    /// Construction fails with a user-visible error on any invalid option;
    /// no partial processor is returned.
    pub fn new(
        config: ProcessorConfig,
        chain: Arc<dyn ChainView>,
        transport: Arc<dyn PollTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let min_score = config.min_quorum_score();

        Ok(Self {
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            // A zero interval would starve the runtime; one millisecond is
            // the floor.
            query_interval: Duration::from_millis(config.query_interval_ms.max(1)),
            stale_vote_threshold: config.stale_vote_threshold,
            stale_vote_factor: config.stale_vote_factor,
            local_proof: config.local_proof,
            chain,
            transport,
            blocks: Mutex::new(ItemRegistry::new(MAX_ELEMENT_POLL)),
            proofs: Mutex::new(ItemRegistry::new(MAX_ELEMENT_POLL)),
            scheduler: Mutex::new(PollScheduler::new()),
            peers: Mutex::new(PeerManager::new(config.stake_utxo_confirmations)),
            quorum: Mutex::new(QuorumGate::new(
                min_score,
                config.min_quorum_connected_stake_ratio,
                config.min_proof_inventories,
            )),
            event_loop: Mutex::new(None),
        })
    }

    // -- Admission ---------------------------------------------------------

    /// Admit a block for reconciliation. Returns `false` for duplicates
    /// and blocks the chain no longer considers candidates.
    pub fn add_block_to_reconcile(&self, block: &BlockRef) -> bool {
        if !self.chain.is_worth_polling(block) {
            return false;
        }

        let mut blocks = self.blocks.lock();
        if blocks.is_finalized(&block.hash) {
            return false;
        }
        // Anything below a finalized block is already settled.
        let settled = blocks
            .finalized_ids()
            .any(|done| self.chain.is_ancestor(&block.hash, done));
        if settled {
            return false;
        }

        matches!(
            blocks.insert(block.clone(), true),
            Admission::Added | Admission::AddedWithEviction(_)
        )
    }

    /// Admit a proof for reconciliation. The proof must already be
    /// registered with the peer manager; immature proofs are refused. A
    /// bound proof starts on the accept side, a conflicting one on the
    /// reject side.
    pub fn add_proof_to_reconcile(&self, proof: &ProofRef) -> bool {
        let mut proofs = self.proofs.lock();
        if proofs.is_finalized(&proof.id) {
            return false;
        }

        let accepted = {
            let peers = self.peers.lock();
            if peers.is_bound_to_peer(&proof.id) {
                true
            } else if peers.is_in_conflicting_pool(&proof.id) {
                false
            } else {
                return false;
            }
        };

        matches!(
            proofs.insert(proof.clone(), accepted),
            Admission::Added | Admission::AddedWithEviction(_)
        )
    }

    // -- Queries -----------------------------------------------------------

    /// Current preference for an item; `false` when unknown.
    pub fn is_accepted(&self, id: &ItemId) -> bool {
        if let Some(record) = self.blocks.lock().get(id) {
            return record.is_accepted();
        }
        self.proofs
            .lock()
            .get(id)
            .map(|record| record.is_accepted())
            .unwrap_or(false)
    }

    /// Confidence for an item; `-1` when unknown.
    pub fn get_confidence(&self, id: &ItemId) -> i32 {
        if let Some(record) = self.blocks.lock().get(id) {
            return i32::from(record.confidence());
        }
        self.proofs
            .lock()
            .get(id)
            .map(|record| i32::from(record.confidence()))
            .unwrap_or(-1)
    }

    /// The round number the next poll will carry.
    pub fn current_round(&self) -> u64 {
        self.scheduler.lock().current_round()
    }

    /// This node's own proof, if it stakes.
    pub fn local_proof(&self) -> Option<&ProofRef> {
        self.local_proof.as_ref()
    }

    // -- Response pipeline -------------------------------------------------

    /// Validate a response and fold its votes into the matching records.
    ///
    /// On validation failure the error names the reject reason and carries
    /// the peer's misbehavior score ([`VoteError::banscore`]). Size and
    /// content mismatches keep the pending query alive, so the peer may
    /// still answer correctly before the timeout.
    pub fn register_votes(
        &self,
        peer: PeerId,
        response: &Response,
    ) -> Result<VoteUpdates, VoteError> {
        let mut blocks = self.blocks.lock();
        let mut proofs = self.proofs.lock();
        let mut scheduler = self.scheduler.lock();
        let mut peers = self.peers.lock();

        {
            let query = scheduler
                .get(peer, response.round)
                .ok_or(VoteError::UnexpectedResponse)?;
            if query.invs.len() != response.votes.len() {
                return Err(VoteError::InvalidResponseSize);
            }
            let ids_match = query
                .invs
                .iter()
                .zip(&response.votes)
                .all(|(inv, vote)| inv.id == vote.id);
            if !ids_match {
                return Err(VoteError::InvalidResponseContent);
            }
        }
        let query = scheduler
            .take(peer, response.round)
            .ok_or(VoteError::UnexpectedResponse)?;

        peers.clear_busy(peer);
        peers.set_cooldown(peer, Duration::from_millis(u64::from(response.cooldown_ms)));

        let mut updates = VoteUpdates::default();
        for (inv, vote) in query.invs.iter().zip(&response.votes) {
            match inv.kind {
                InvKind::Block => {
                    self.advance_block_vote(&mut blocks, peer, &inv.id, vote.outcome, &mut updates)
                }
                InvKind::Proof => self.advance_proof_vote(
                    &mut proofs,
                    &mut peers,
                    peer,
                    &inv.id,
                    vote.outcome,
                    &mut updates,
                ),
            }
        }
        Ok(updates)
    }

    fn advance_block_vote(
        &self,
        blocks: &mut ItemRegistry<BlockRef>,
        peer: PeerId,
        id: &ItemId,
        outcome: i32,
        updates: &mut VoteUpdates,
    ) {
        let (item, status) = {
            let Some((item, record)) = blocks.get_mut(id) else {
                // Evicted or purged since the poll went out.
                return;
            };
            record.clear_inflight();
            let status = if record.register_vote(peer, outcome) {
                Some(Self::status_of(record))
            } else if record.is_stale(self.stale_vote_threshold, self.stale_vote_factor) {
                Some(VoteStatus::Stale)
            } else {
                None
            };
            (item.clone(), status)
        };

        let Some(status) = status else { return };
        updates.blocks.push(BlockUpdate {
            item: item.clone(),
            status,
        });

        match status {
            VoteStatus::Finalized => {
                info!(block = %item.hash, "block finalized");
                blocks.remove(id);
                blocks.mark_finalized(item.hash);
                // Ancestors are settled along with it; they get no update.
                let purged =
                    blocks.purge(|resident| !self.chain.is_ancestor(&resident.hash, &item.hash));
                for ancestor in purged {
                    blocks.mark_finalized(ancestor.hash);
                }
                self.chain.on_block_finalized(&item);
            }
            VoteStatus::Invalid => {
                info!(block = %item.hash, "block rejection finalized");
                blocks.remove(id);
                self.chain.on_block_invalidated(&item);
            }
            VoteStatus::Stale => {
                debug!(block = %item.hash, "block vote went stale");
                blocks.remove(id);
            }
            VoteStatus::Accepted | VoteStatus::Rejected => {}
        }
    }

    fn advance_proof_vote(
        &self,
        proofs: &mut ItemRegistry<ProofRef>,
        peers: &mut PeerManager,
        peer: PeerId,
        id: &ItemId,
        outcome: i32,
        updates: &mut VoteUpdates,
    ) {
        let (item, status) = {
            let Some((item, record)) = proofs.get_mut(id) else {
                return;
            };
            record.clear_inflight();
            let status = if record.register_vote(peer, outcome) {
                Some(Self::status_of(record))
            } else if record.is_stale(self.stale_vote_threshold, self.stale_vote_factor) {
                Some(VoteStatus::Stale)
            } else {
                None
            };
            (item.clone(), status)
        };

        let Some(status) = status else { return };
        updates.proofs.push(ProofUpdate {
            item: item.clone(),
            status,
        });

        match status {
            VoteStatus::Finalized => {
                info!(proof = %item.id, "proof finalized");
                proofs.remove(id);
                proofs.mark_finalized(item.id);
                peers.on_proof_finalized(id);
            }
            VoteStatus::Invalid => {
                info!(proof = %item.id, "proof rejection finalized");
                proofs.remove(id);
                // Backing peers lose their proof; their outstanding
                // queries are left to the timeout sweep.
                peers.reject_proof(id);
            }
            VoteStatus::Stale => {
                debug!(proof = %item.id, "proof vote went stale");
                proofs.remove(id);
            }
            VoteStatus::Accepted | VoteStatus::Rejected => {}
        }
    }

    fn status_of(record: &VoteRecord) -> VoteStatus {
        match (record.is_accepted(), record.has_finalized()) {
            (true, true) => VoteStatus::Finalized,
            (true, false) => VoteStatus::Accepted,
            (false, true) => VoteStatus::Invalid,
            (false, false) => VoteStatus::Rejected,
        }
    }

    // -- Polling -----------------------------------------------------------

    /// The batch the next poll would carry: blocks by descending work, then
    /// proofs by descending score, skipping saturated and dead items.
    pub fn get_invs_for_next_poll(&self) -> Vec<Inv> {
        let blocks = self.blocks.lock();
        let proofs = self.proofs.lock();
        let peers = self.peers.lock();
        self.build_invs(&blocks, &proofs, &peers)
    }

    fn build_invs(
        &self,
        blocks: &ItemRegistry<BlockRef>,
        proofs: &ItemRegistry<ProofRef>,
        peers: &PeerManager,
    ) -> Vec<Inv> {
        let mut invs = Vec::new();
        for (item, record) in blocks.iter() {
            if invs.len() >= MAX_ELEMENT_POLL {
                return invs;
            }
            if !record.should_poll() || !self.chain.is_worth_polling(item) {
                continue;
            }
            invs.push(Inv::block(item.hash));
        }
        for (item, record) in proofs.iter() {
            if invs.len() >= MAX_ELEMENT_POLL {
                break;
            }
            if !record.should_poll() {
                continue;
            }
            let live = peers.is_bound_to_peer(&item.id) || peers.is_in_conflicting_pool(&item.id);
            if !live {
                continue;
            }
            invs.push(Inv::proof(item.id));
        }
        invs
    }

    /// Run one scheduling step: expire overdue queries, then emit at most
    /// one poll. Normally driven by the event loop; exposed for tests and
    /// tools.
    pub fn tick(&self) {
        let now = Instant::now();
        self.expire_timed_out_queries(now);

        if !self.is_quorum_established() {
            return;
        }

        if let Some((peer, poll)) = self.prepare_poll(now) {
            debug!(peer, round = poll.round, invs = poll.invs.len(), "emitting poll");
            self.transport.send_poll(peer, poll);
        }
    }

    fn expire_timed_out_queries(&self, now: Instant) {
        let mut blocks = self.blocks.lock();
        let mut proofs = self.proofs.lock();
        let mut scheduler = self.scheduler.lock();
        let mut peers = self.peers.lock();

        for query in scheduler.expire(now) {
            debug!(peer = query.peer, round = query.round, "query timed out");
            Self::release_invs(&mut blocks, &mut proofs, &query.invs);
            peers.clear_busy(query.peer);
        }
    }

    fn prepare_poll(&self, now: Instant) -> Option<(PeerId, Poll)> {
        let mut blocks = self.blocks.lock();
        let mut proofs = self.proofs.lock();
        let mut scheduler = self.scheduler.lock();
        let mut peers = self.peers.lock();

        let peer = peers.select_node(now)?;
        let invs = self.build_invs(&blocks, &proofs, &peers);
        if invs.is_empty() {
            return None;
        }

        let round = scheduler.next_round();
        if !scheduler.register_query(peer, round, now + self.query_timeout, invs.clone()) {
            return None;
        }
        for inv in &invs {
            match inv.kind {
                InvKind::Block => {
                    if let Some((_, record)) = blocks.get_mut(&inv.id) {
                        record.register_poll();
                    }
                }
                InvKind::Proof => {
                    if let Some((_, record)) = proofs.get_mut(&inv.id) {
                        record.register_poll();
                    }
                }
            }
        }
        peers.mark_busy(peer);
        Some((peer, Poll { round, invs }))
    }

    fn release_invs(
        blocks: &mut ItemRegistry<BlockRef>,
        proofs: &mut ItemRegistry<ProofRef>,
        invs: &[Inv],
    ) {
        for inv in invs {
            match inv.kind {
                InvKind::Block => {
                    if let Some((_, record)) = blocks.get_mut(&inv.id) {
                        record.clear_inflight();
                    }
                }
                InvKind::Proof => {
                    if let Some((_, record)) = proofs.get_mut(&inv.id) {
                        record.clear_inflight();
                    }
                }
            }
        }
    }

    // -- Peers and quorum ----------------------------------------------------

    /// Scoped exclusive access to the peer manager.
    pub fn with_peer_manager<R>(&self, f: impl FnOnce(&mut PeerManager) -> R) -> R {
        f(&mut self.peers.lock())
    }

    /// Handle a peer going away: its outstanding queries are evicted and
    /// the node is detached.
    pub fn peer_disconnected(&self, peer: PeerId) {
        let mut blocks = self.blocks.lock();
        let mut proofs = self.proofs.lock();
        let mut scheduler = self.scheduler.lock();
        let mut peers = self.peers.lock();

        for query in scheduler.evict_peer(peer) {
            Self::release_invs(&mut blocks, &mut proofs, &query.invs);
        }
        peers.remove_node(peer);
    }

    /// Count a peer's initial proof inventory toward quorum readiness.
    /// Repeats from the same peer are ignored.
    pub fn record_proof_inventory(&self, peer: PeerId) -> bool {
        self.quorum.lock().record_proof_inventory(peer)
    }

    /// Distinct peers that delivered a proof inventory so far.
    pub fn proof_inventory_count(&self) -> u64 {
        self.quorum.lock().inventory_count()
    }

    /// Whether the staked peer set is rich enough for votes to count.
    /// Latches once established.
    pub fn is_quorum_established(&self) -> bool {
        let (total, connected) = {
            let peers = self.peers.lock();
            let mut connected = peers.connected_peers_score();
            if let Some(local) = &self.local_proof {
                // We are always connected to our own proof, even when no
                // peer advertises it.
                if peers.is_bound_to_peer(&local.id) && !peers.has_node_attached(&local.id) {
                    connected += u64::from(local.score);
                }
            }
            (peers.total_peers_score(), connected)
        };
        self.quorum.lock().is_established(total, connected)
    }

    // -- Event loop ----------------------------------------------------------

    /// Install the repeating poll task on the ambient tokio runtime.
    /// Returns `false` if the loop is already running.
    pub fn start_event_loop(self: &Arc<Self>) -> bool {
        let mut slot = self.event_loop.lock();
        if slot.is_some() {
            return false;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let weak = Arc::downgrade(self);
        let interval = self.query_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => {
                        // Hold a strong reference for the duration of the
                        // tick; once the processor is dropped the loop ends.
                        match weak.upgrade() {
                            Some(processor) => processor.tick(),
                            None => break,
                        }
                    }
                }
            }
        });

        *slot = Some(stop_tx);
        info!("event loop started");
        true
    }

    /// Cancel the repeating poll task. In-flight ticks run to completion.
    /// Returns `false` if the loop is not running.
    pub fn stop_event_loop(&self) -> bool {
        match self.event_loop.lock().take() {
            Some(stop_tx) => {
                let _ = stop_tx.send(());
                info!("event loop stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        // Stop the loop promptly; the weak upgrade would end it anyway.
        if let Some(stop_tx) = self.event_loop.get_mut().take() {
            let _ = stop_tx.send(());
        }
    }
}
