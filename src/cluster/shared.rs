use super::state::{ClaimedChunk, ClusterState, MergeOutcome, TargetChange};
use super::types::*;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Thread-safe handle to the local replica.
///
/// Every operation takes the lock for the duration of one state mutation and
/// never across I/O or a search loop. Cloning is cheap.
#[derive(Clone)]
pub struct SharedCluster {
    inner: Arc<Mutex<ClusterState>>,
    local: PeerId,
    terminal: CancellationToken,
}

impl SharedCluster {
    pub fn new(local: PeerId) -> Self {
        Self::from_state(ClusterState::new(local))
    }

    /// A replica whose claims expire after `claim_ttl`.
    pub fn with_claim_ttl(local: PeerId, claim_ttl: Duration) -> Self {
        Self::from_state(ClusterState::with_claim_ttl(local, claim_ttl))
    }

    fn from_state(state: ClusterState) -> Self {
        let local = state.local().clone();
        let terminal = state.terminal_token();
        Self {
            inner: Arc::new(Mutex::new(state)),
            local,
            terminal,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn local(&self) -> &PeerId {
        &self.local
    }

    /// Checked without taking the lock.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_cancelled()
    }

    pub fn terminal_token(&self) -> CancellationToken {
        self.terminal.clone()
    }

    pub fn target(&self) -> Option<Target> {
        self.lock().target().cloned()
    }

    pub fn found(&self) -> Option<Found> {
        self.lock().found().cloned()
    }

    pub fn chunk(&self, chunk_id: u64) -> ChunkStatus {
        self.lock().chunk(chunk_id)
    }

    pub fn offer_target(&self, target: &Target) -> TargetChange {
        self.lock().offer_target(target)
    }

    pub fn merge_snapshot(&self, snapshot: &Snapshot) -> MergeOutcome {
        self.lock().merge_snapshot(snapshot)
    }

    pub fn merge_announcement(&self, search: &SearchKey, status: &ChunkStatus) -> MergeOutcome {
        self.lock().merge_announcement(search, status)
    }

    pub fn record_found(&self, found: &Found) -> bool {
        self.lock().record_found(found)
    }

    pub fn claim_next(&self) -> Option<ClaimedChunk> {
        self.lock().claim_next(now_ms())
    }

    pub fn complete(&self, chunk_id: u64) -> Option<ChunkStatus> {
        self.lock().complete(chunk_id, now_ms())
    }

    pub fn report_found(&self, chunk_id: u64, candidate: &str) -> Option<Found> {
        self.lock().report_found(chunk_id, candidate)
    }

    pub fn release(&self, chunk_id: u64) -> Option<ChunkStatus> {
        self.lock().release(chunk_id, now_ms())
    }

    pub fn renew_claims(&self) -> Vec<ChunkStatus> {
        self.lock().renew_claims(now_ms())
    }

    pub fn reclaim_expired(&self, ttl: Duration) -> Vec<u64> {
        self.lock().reclaim_expired(now_ms(), ttl)
    }

    pub fn touch_peer(&self, peer_id: &PeerId, addr: SocketAddr) -> bool {
        self.lock().touch_peer(peer_id, addr, Instant::now())
    }

    pub fn expire_peers(&self, timeout: Duration) -> Vec<PeerId> {
        self.lock().expire_peers(Instant::now(), timeout)
    }

    pub fn remove_peer(&self, peer_id: &PeerId) -> Vec<ChunkStatus> {
        self.lock().remove_peer(peer_id)
    }

    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.lock().peers().map(|p| p.addr).collect()
    }

    pub fn snapshot_pages(&self, page_size: usize) -> Vec<Snapshot> {
        self.lock().snapshot_pages(page_size)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.lock().status(Instant::now())
    }
}
