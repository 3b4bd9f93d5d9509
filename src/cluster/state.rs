//! The per-peer replica of the cluster state and its merge rules.

use super::types::*;
use crate::candidate::CandidateSpace;
use crate::chunking::{Chunk, ChunkPlan};
use crate::fingerprint::{DigestAlgorithm, Fingerprint};

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Claim age after which other peers may reclaim a chunk, unless configured.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(30);

/// Result of offering a Target to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetChange {
    #[default]
    Unchanged,
    /// No Target before; this one was adopted.
    Adopted,
    /// A competing Target won the tie-break; local progress was discarded.
    Replaced,
    /// The Target describes an invalid space or a malformed fingerprint.
    Rejected,
}

/// What a merge changed. The coordinator uses it to log and to re-broadcast.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub target: TargetChange,
    pub updated: usize,
    /// Chunks this peer stopped searching because another peer won them.
    pub aborted: Vec<u64>,
    /// Claims this peer kept and re-stamped; they should be announced.
    pub reasserted: Vec<ChunkStatus>,
    /// Stale claims of this peer released back to pending.
    pub released: Vec<ChunkStatus>,
    pub became_terminal: bool,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.target == TargetChange::Unchanged
            && self.updated == 0
            && self.aborted.is_empty()
            && self.reasserted.is_empty()
            && self.released.is_empty()
            && !self.became_terminal
    }
}

/// A chunk handed to a worker, with everything it needs to search it.
pub struct ClaimedChunk {
    pub chunk: Chunk,
    pub status: ChunkStatus,
    pub token: CancellationToken,
    pub space: Arc<dyn CandidateSpace>,
    pub fingerprint: Fingerprint,
    pub algorithm: DigestAlgorithm,
}

struct ActiveSearch {
    target: Target,
    plan: ChunkPlan,
    space: Arc<dyn CandidateSpace>,
}

pub struct ClusterState {
    local: PeerId,
    search: Option<ActiveSearch>,
    /// Sparse chunk table. Missing ids are pending with `last_update == 0`.
    chunks: BTreeMap<u64, ChunkStatus>,
    /// No pending chunk below this id.
    pending_floor: u64,
    in_flight: HashMap<u64, CancellationToken>,
    peers: HashMap<PeerId, PeerRecord>,
    found: Option<Found>,
    terminal: CancellationToken,
    /// Claims older than this are abandoned; they neither win races nor
    /// survive a sweep.
    claim_ttl: Duration,
}

impl ClusterState {
    pub fn new(local: PeerId) -> Self {
        Self::with_claim_ttl(local, DEFAULT_CLAIM_TTL)
    }

    pub fn with_claim_ttl(local: PeerId, claim_ttl: Duration) -> Self {
        Self {
            local,
            search: None,
            chunks: BTreeMap::new(),
            pending_floor: 0,
            in_flight: HashMap::new(),
            peers: HashMap::new(),
            found: None,
            terminal: CancellationToken::new(),
            claim_ttl,
        }
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    pub fn target(&self) -> Option<&Target> {
        self.search.as_ref().map(|s| &s.target)
    }

    pub fn plan(&self) -> Option<&ChunkPlan> {
        self.search.as_ref().map(|s| &s.plan)
    }

    pub fn found(&self) -> Option<&Found> {
        self.found.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.found.is_some()
    }

    /// Cancelled once, when the first valid Found is recorded.
    pub fn terminal_token(&self) -> CancellationToken {
        self.terminal.clone()
    }

    /// Effective status of a chunk, including the implicit pending default.
    pub fn chunk(&self, chunk_id: u64) -> ChunkStatus {
        self.chunks
            .get(&chunk_id)
            .cloned()
            .unwrap_or_else(|| ChunkStatus::pending(chunk_id))
    }

    pub fn in_flight(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.in_flight.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    // ------------------------------------------------------------------
    // Target
    // ------------------------------------------------------------------

    /// Offers a Target. Adopted when there is none, or when it beats the
    /// current one (smaller creator id). Ignored once the search is terminal.
    pub fn offer_target(&mut self, candidate: &Target) -> TargetChange {
        if self.is_terminal() {
            return TargetChange::Unchanged;
        }
        if let Some(current) = self.target()
            && (current == candidate || !candidate.beats(current))
        {
            return TargetChange::Unchanged;
        }

        if candidate.fingerprint.as_bytes().len() != candidate.algorithm.output_len() {
            tracing::warn!(
                "Rejecting target from {}: fingerprint is not a {} digest",
                candidate.creator,
                candidate.algorithm
            );
            return TargetChange::Rejected;
        }

        let built = candidate
            .space
            .build()
            .and_then(|space| Ok((candidate.policy.plan(space.size())?, space)));
        let (plan, space) = match built {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!("Rejecting target from {}: {}", candidate.creator, e);
                return TargetChange::Rejected;
            }
        };

        let change = if self.search.is_some() {
            TargetChange::Replaced
        } else {
            TargetChange::Adopted
        };

        self.abort_all();
        self.chunks.clear();
        self.pending_floor = 0;
        self.search = Some(ActiveSearch {
            target: candidate.clone(),
            plan,
            space,
        });

        change
    }

    // ------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------

    /// Merges one snapshot page: Target first, then chunk entries (only when
    /// both sides describe the same search), then the found flag.
    pub fn merge_snapshot(&mut self, snapshot: &Snapshot) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if let Some(target) = &snapshot.target {
            outcome.target = self.offer_target(target);
        }

        let same_search = matches!(
            (self.target(), snapshot.target.as_ref()),
            (Some(local), Some(remote)) if local == remote
        );
        if same_search {
            for entry in &snapshot.entries {
                self.merge_entry(entry, &mut outcome);
            }
        }

        if let Some(found) = &snapshot.found {
            outcome.became_terminal = self.record_found(found);
        }

        outcome
    }

    /// Merges a single claim or completion announced for `search`.
    pub fn merge_announcement(&mut self, search: &SearchKey, status: &ChunkStatus) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if self.target().map(Target::key).as_ref() == Some(search) {
            self.merge_entry(status, &mut outcome);
        }
        outcome
    }

    fn merge_entry(&mut self, remote: &ChunkStatus, outcome: &mut MergeOutcome) {
        let Some(total) = self.plan().map(ChunkPlan::len) else {
            return;
        };
        let id = remote.chunk_id;
        if id >= total {
            tracing::debug!("Ignoring entry for chunk {} outside plan of {}", id, total);
            return;
        }

        let local = self.chunk(id);

        if self.in_flight.contains_key(&id) {
            if remote.state == ChunkState::Claimed
                && let Some(owner) = &remote.owner
                && owner < &self.local
                && self.is_live_against(remote, &local)
            {
                // Lost the race: stop, and record the winner's claim so that
                // it also dominates our own earlier stamp.
                self.abort(id);
                outcome.aborted.push(id);
                self.store(ChunkStatus {
                    chunk_id: id,
                    state: ChunkState::Claimed,
                    owner: Some(owner.clone()),
                    last_update: remote.last_update.max(local.last_update + 1),
                });
                outcome.updated += 1;
                return;
            }
            if !remote.dominates(&local) {
                return;
            }
            match (&remote.state, &remote.owner) {
                (ChunkState::Completed, _) => {
                    self.abort(id);
                    outcome.aborted.push(id);
                    self.store(remote.clone());
                    outcome.updated += 1;
                }
                (ChunkState::Claimed, Some(owner)) if owner == &self.local => {
                    // Echo of one of our own renewals.
                    self.store(remote.clone());
                    outcome.updated += 1;
                }
                _ => {
                    // Claimed by a larger id, or released behind our back.
                    let kept = ChunkStatus {
                        chunk_id: id,
                        state: ChunkState::Claimed,
                        owner: Some(self.local.clone()),
                        last_update: remote.last_update + 1,
                    };
                    self.store(kept.clone());
                    outcome.reasserted.push(kept);
                }
            }
            return;
        }

        if !remote.dominates(&local) {
            return;
        }

        if remote.is_claimed_by(&self.local) {
            // A claim of ours we are not working on any more.
            let released = ChunkStatus {
                chunk_id: id,
                state: ChunkState::Pending,
                owner: None,
                last_update: remote.last_update + 1,
            };
            self.store(released.clone());
            outcome.released.push(released);
            return;
        }

        self.store(remote.clone());
        outcome.updated += 1;
    }

    /// Whether `remote` is recent enough to contest our in-flight `local`
    /// claim. Ours is renewed every gossip interval, so a remote claim more
    /// than one TTL behind it belongs to an owner that stopped renewing.
    fn is_live_against(&self, remote: &ChunkStatus, local: &ChunkStatus) -> bool {
        let ttl_ms = self.claim_ttl.as_millis() as u64;
        remote.last_update.saturating_add(ttl_ms) >= local.last_update
    }

    /// Records a match. Returns `true` only when this call made the search
    /// terminal. Reports that do not verify against the local Target are
    /// dropped.
    pub fn record_found(&mut self, found: &Found) -> bool {
        let Some(target) = self.target() else {
            tracing::debug!("Ignoring found from {} before any target", found.finder);
            return false;
        };
        if found.fingerprint != target.fingerprint {
            tracing::debug!("Ignoring found for a different target from {}", found.finder);
            return false;
        }
        if !target
            .algorithm
            .fingerprinter()
            .matches(&found.candidate, target.fingerprint.as_bytes())
        {
            tracing::warn!("Ignoring unverifiable found from {}", found.finder);
            return false;
        }

        match &self.found {
            None => {
                self.found = Some(found.clone());
                self.in_flight.clear();
                self.terminal.cancel();
                true
            }
            Some(current) => {
                if found.precedes(current) {
                    self.found = Some(found.clone());
                }
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Local work
    // ------------------------------------------------------------------

    /// Claims the lowest pending chunk.
    pub fn claim_next(&mut self, now: u64) -> Option<ClaimedChunk> {
        if self.is_terminal() {
            return None;
        }
        let total = self.plan()?.len();

        let mut id = self.pending_floor;
        while id < total {
            match self.chunks.get(&id) {
                Some(entry) if entry.state != ChunkState::Pending => id += 1,
                _ => break,
            }
        }
        self.pending_floor = id;
        if id >= total {
            return None;
        }

        let previous = self.chunk(id);
        let status = ChunkStatus {
            chunk_id: id,
            state: ChunkState::Claimed,
            owner: Some(self.local.clone()),
            last_update: stamp(&previous, now),
        };
        self.store(status.clone());

        let token = self.terminal.child_token();
        self.in_flight.insert(id, token.clone());

        let search = self.search.as_ref()?;
        Some(ClaimedChunk {
            chunk: search.plan.chunk(id)?,
            status,
            token,
            space: search.space.clone(),
            fingerprint: search.target.fingerprint.clone(),
            algorithm: search.target.algorithm,
        })
    }

    /// Marks an in-flight chunk completed. Returns `None` when the chunk was
    /// aborted meanwhile; a lost chunk is never reported complete.
    pub fn complete(&mut self, chunk_id: u64, now: u64) -> Option<ChunkStatus> {
        self.in_flight.remove(&chunk_id)?;

        let previous = self.chunk(chunk_id);
        let status = ChunkStatus {
            chunk_id,
            state: ChunkState::Completed,
            owner: Some(self.local.clone()),
            last_update: stamp(&previous, now),
        };
        self.store(status.clone());
        Some(status)
    }

    /// Records a match found locally.
    pub fn report_found(&mut self, chunk_id: u64, candidate: &str) -> Option<Found> {
        let fingerprint = self.target()?.fingerprint.clone();
        let found = Found {
            candidate: candidate.to_string(),
            finder: self.local.clone(),
            chunk_id,
            fingerprint,
        };
        self.in_flight.remove(&chunk_id);
        self.record_found(&found);
        self.found.clone()
    }

    /// Gives up an in-flight chunk. Returns the release to announce when the
    /// chunk was still ours.
    pub fn release(&mut self, chunk_id: u64, now: u64) -> Option<ChunkStatus> {
        self.abort(chunk_id);

        let current = self.chunk(chunk_id);
        if !current.is_claimed_by(&self.local) {
            return None;
        }
        let status = ChunkStatus {
            chunk_id,
            state: ChunkState::Pending,
            owner: None,
            last_update: stamp(&current, now),
        };
        self.store(status.clone());
        Some(status)
    }

    /// Re-stamps the chunks this peer is searching so they are not reclaimed.
    pub fn renew_claims(&mut self, now: u64) -> Vec<ChunkStatus> {
        let mut renewed = Vec::new();
        for id in self.in_flight() {
            let mut status = self.chunk(id);
            if !status.is_claimed_by(&self.local) {
                continue;
            }
            status.last_update = stamp(&status, now);
            self.store(status.clone());
            renewed.push(status);
        }
        renewed
    }

    /// Reverts claims of other peers older than `ttl` to pending. Own claims
    /// are never reclaimed.
    pub fn reclaim_expired(&mut self, now: u64, ttl: Duration) -> Vec<u64> {
        let ttl_ms = ttl.as_millis() as u64;
        let expired: Vec<u64> = self
            .chunks
            .values()
            .filter(|s| {
                s.state == ChunkState::Claimed
                    && s.owner.as_ref() != Some(&self.local)
                    && now.saturating_sub(s.last_update) > ttl_ms
            })
            .map(|s| s.chunk_id)
            .collect();

        for id in &expired {
            self.store(ChunkStatus::pending(*id));
        }
        expired
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Refreshes a peer record. Returns `true` for a newly seen peer.
    pub fn touch_peer(&mut self, peer_id: &PeerId, addr: SocketAddr, now: Instant) -> bool {
        if peer_id == &self.local {
            return false;
        }
        match self.peers.get_mut(peer_id) {
            Some(record) => {
                record.addr = addr;
                record.last_seen = now;
                false
            }
            None => {
                self.peers.insert(
                    peer_id.clone(),
                    PeerRecord {
                        peer_id: peer_id.clone(),
                        addr,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Forgets peers silent for longer than `timeout`. Their claims are left
    /// to the reclaim TTL.
    pub fn expire_peers(&mut self, now: Instant, timeout: Duration) -> Vec<PeerId> {
        let silent: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| now.saturating_duration_since(p.last_seen) > timeout)
            .map(|p| p.peer_id.clone())
            .collect();
        for peer in &silent {
            self.peers.remove(peer);
        }
        silent
    }

    /// Handles a Goodbye: drops the peer and releases its claims.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Vec<ChunkStatus> {
        self.peers.remove(peer_id);

        let released: Vec<ChunkStatus> = self
            .chunks
            .values()
            .filter(|s| s.is_claimed_by(peer_id))
            .map(|s| ChunkStatus {
                chunk_id: s.chunk_id,
                state: ChunkState::Pending,
                owner: None,
                last_update: s.last_update + 1,
            })
            .collect();
        for status in &released {
            self.store(status.clone());
        }
        released
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// The replicated state, cut into pages of at most `page_size` entries.
    /// Always at least one page, so an empty replica still announces itself.
    pub fn snapshot_pages(&self, page_size: usize) -> Vec<Snapshot> {
        let target = self.target().cloned();
        let entries: Vec<ChunkStatus> = self.chunks.values().cloned().collect();

        if entries.is_empty() {
            return vec![Snapshot {
                target,
                found: self.found.clone(),
                entries,
            }];
        }

        entries
            .chunks(page_size.max(1))
            .map(|page| Snapshot {
                target: target.clone(),
                found: self.found.clone(),
                entries: page.to_vec(),
            })
            .collect()
    }

    pub fn status(&self, now: Instant) -> StatusSnapshot {
        let total_chunks = self.plan().map(ChunkPlan::len).unwrap_or(0);
        let mut claimed = 0;
        let mut completed = 0;
        let mut claims = Vec::new();
        for status in self.chunks.values() {
            match status.state {
                ChunkState::Claimed => {
                    claimed += 1;
                    if let Some(owner) = &status.owner {
                        claims.push((status.chunk_id, owner.clone()));
                    }
                }
                ChunkState::Completed => completed += 1,
                ChunkState::Pending => {}
            }
        }

        let target = self.search.as_ref().map(|s| TargetSummary {
            fingerprint: s.target.fingerprint.to_hex(),
            algorithm: s.target.algorithm,
            creator: s.target.creator.clone(),
            created_at: s.target.created_at,
            space: s.target.space.describe(),
            candidates: s.plan.total(),
        });

        let mut peers: Vec<PeerView> = self
            .peers
            .values()
            .map(|p| PeerView {
                peer_id: p.peer_id.clone(),
                addr: p.addr,
                seen_ms_ago: now.saturating_duration_since(p.last_seen).as_millis() as u64,
            })
            .collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        StatusSnapshot {
            peer_id: self.local.clone(),
            target,
            total_chunks,
            pending: total_chunks - claimed - completed,
            claimed,
            completed,
            in_flight: self.in_flight(),
            claims,
            peers,
            found: self.found.clone(),
            terminal: self.is_terminal(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn store(&mut self, status: ChunkStatus) {
        let id = status.chunk_id;
        if status.state == ChunkState::Pending {
            self.pending_floor = self.pending_floor.min(id);
        }
        if status.is_default() {
            self.chunks.remove(&id);
        } else {
            self.chunks.insert(id, status);
        }
    }

    fn abort(&mut self, chunk_id: u64) {
        if let Some(token) = self.in_flight.remove(&chunk_id) {
            token.cancel();
        }
    }

    fn abort_all(&mut self) {
        for (_, token) in self.in_flight.drain() {
            token.cancel();
        }
    }
}

/// A local write must dominate the entry it replaces even when the wall clock
/// lags behind a remote stamp.
fn stamp(previous: &ChunkStatus, now: u64) -> u64 {
    now.max(previous.last_update + 1)
}
