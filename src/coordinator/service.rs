use crate::cluster::{
    ClaimedChunk, MergeOutcome, PeerId, SharedCluster, StatusSnapshot, Target, TargetChange,
};
use crate::config::Timings;
use crate::gossip::{Envelope, GossipMessage, SNAPSHOT_PAGE, Transport, ensure_target_fits};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Glue between the local replica, the transport and the workers.
///
/// Owns three background tasks: a listener that merges everything it hears,
/// a broadcaster that periodically renews local claims and sends the full
/// replica, and a sweeper that reclaims abandoned chunks and forgets silent
/// peers.
pub struct Coordinator {
    cluster: SharedCluster,
    transport: Arc<dyn Transport>,
    timings: Timings,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(cluster: SharedCluster, transport: Arc<dyn Transport>, timings: Timings) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            transport,
            timings,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local(&self) -> &PeerId {
        self.cluster.local()
    }

    pub fn cluster(&self) -> &SharedCluster {
        &self.cluster
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Cancelled by `shutdown`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn start(self: &Arc<Self>) {
        info!(
            "Starting coordinator for peer {} on {}",
            self.local(),
            self.transport.local_addr()
        );

        let _receive_handle = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.receive_loop().await;
            })
        };

        let _broadcast_handle = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.broadcast_loop().await;
            })
        };

        let _sweep_handle = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.sweep_loop().await;
            })
        };

        tracing::debug!("Coordinator background tasks started");
    }

    // ------------------------------------------------------------------
    // Worker-facing operations
    // ------------------------------------------------------------------

    /// Claims the lowest pending chunk and announces the claim.
    pub async fn claim_next_chunk(&self) -> Option<ClaimedChunk> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        let claimed = self.cluster.claim_next()?;
        let search = self.cluster.target()?.key();

        info!(
            "Claimed chunk {} [{}..{})",
            claimed.chunk.id,
            claimed.chunk.offset,
            claimed.chunk.end()
        );
        self.broadcast(GossipMessage::ChunkClaim {
            search,
            status: claimed.status.clone(),
        })
        .await;

        Some(claimed)
    }

    /// Announces a finished chunk. Returns `false` when the chunk had been
    /// lost to another peer meanwhile, in which case nothing is announced.
    pub async fn report_complete(&self, chunk_id: u64) -> bool {
        let Some(status) = self.cluster.complete(chunk_id) else {
            tracing::debug!("Chunk {} no longer ours, not reporting completion", chunk_id);
            return false;
        };
        let Some(search) = self.cluster.target().map(|t| t.key()) else {
            return false;
        };

        info!("Completed chunk {} without a match", chunk_id);
        self.broadcast(GossipMessage::ChunkComplete { search, status })
            .await;
        true
    }

    /// Records a local match and tells everyone immediately.
    pub async fn report_found(&self, chunk_id: u64, candidate: &str) {
        let Some(found) = self.cluster.report_found(chunk_id, candidate) else {
            tracing::warn!("Match in chunk {} reported without a target", chunk_id);
            return;
        };

        info!(
            "FOUND {:?} in chunk {} (recorded finder {})",
            found.candidate, chunk_id, found.finder
        );
        self.broadcast(GossipMessage::Found(found)).await;
        self.broadcast_snapshot().await;
    }

    /// Gives a chunk back after an abort.
    pub async fn release(&self, chunk_id: u64) {
        if let Some(status) = self.cluster.release(chunk_id) {
            tracing::debug!("Released chunk {} at {}", chunk_id, status.last_update);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.cluster.is_terminal()
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.cluster.status()
    }

    // ------------------------------------------------------------------
    // Target lifecycle
    // ------------------------------------------------------------------

    /// Offers a locally built Target to the cluster. A Target too large to
    /// gossip is rejected without touching the replica.
    pub async fn propose_target(&self, target: Target) -> TargetChange {
        if let Err(e) = ensure_target_fits(&target) {
            tracing::warn!("Not proposing target: {}", e);
            return TargetChange::Rejected;
        }
        let change = self.cluster.offer_target(&target);
        match change {
            TargetChange::Adopted | TargetChange::Replaced => {
                info!(
                    "Proposed target {} ({}, {})",
                    target.fingerprint,
                    target.algorithm,
                    target.space.describe()
                );
                self.broadcast_snapshot().await;
            }
            TargetChange::Unchanged => {
                if let Some(current) = self.cluster.target()
                    && current != target
                {
                    info!(
                        "Keeping target of {} over local proposal",
                        current.creator
                    );
                }
            }
            TargetChange::Rejected => {}
        }
        change
    }

    /// Joins the cluster's search. With a proposal, it is offered right away
    /// and the tie-break decides; without one, waits up to the sync window
    /// for a Target from the network.
    pub async fn establish_target(&self, proposal: Option<Target>) -> Option<Target> {
        self.request_state().await;

        match proposal {
            Some(target) => {
                self.propose_target(target).await;
                self.cluster.target()
            }
            None => self.wait_for_target(self.timings.sync_wait()).await,
        }
    }

    /// Polls for a Target until `timeout` elapses or the coordinator stops.
    pub async fn wait_for_target(&self, timeout: Duration) -> Option<Target> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(target) = self.cluster.target() {
                return Some(target);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let nap = self.timings.target_poll().min(deadline - now);
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Asks every reachable peer for its full replica.
    pub async fn request_state(&self) {
        tracing::debug!("Requesting state from peers");
        self.broadcast(GossipMessage::StateRequest).await;
    }

    /// Releases local work, says goodbye and stops the background tasks.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        for chunk_id in self.cluster.status().in_flight {
            self.cluster.release(chunk_id);
        }
        info!("Leaving the cluster");
        self.broadcast(GossipMessage::Goodbye).await;
        self.shutdown.cancel();
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    async fn receive_loop(&self) {
        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.transport.recv() => received,
            };

            match received {
                Ok((payload, src)) => match Envelope::decode(&payload) {
                    Ok(envelope) => self.handle_envelope(envelope, src).await,
                    Err(e) => {
                        tracing::warn!("Failed to decode datagram from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to receive datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        tracing::debug!("Receive loop stopped");
    }

    async fn handle_envelope(&self, envelope: Envelope, src: SocketAddr) {
        if &envelope.from == self.local() {
            return;
        }
        self.transport.note_peer(src);
        if self.cluster.touch_peer(&envelope.from, src) {
            info!("Discovered peer {} at {}", envelope.from, src);
        }

        tracing::trace!("Received {} from {}", envelope.message.kind(), envelope.from);

        match envelope.message {
            GossipMessage::Heartbeat => {}

            GossipMessage::Snapshot(snapshot) => {
                let outcome = self.cluster.merge_snapshot(&snapshot);
                self.after_merge(&envelope.from, outcome).await;
            }

            GossipMessage::ChunkClaim { search, status }
            | GossipMessage::ChunkComplete { search, status } => {
                let outcome = self.cluster.merge_announcement(&search, &status);
                self.after_merge(&envelope.from, outcome).await;
            }

            GossipMessage::Found(found) => {
                if self.cluster.record_found(&found) {
                    self.on_terminal().await;
                }
            }

            GossipMessage::StateRequest => {
                tracing::debug!("Sending state to {} on request", envelope.from);
                for page in self.cluster.snapshot_pages(SNAPSHOT_PAGE) {
                    self.send_to(src, GossipMessage::Snapshot(page)).await;
                }
            }

            GossipMessage::Goodbye => {
                let released = self.cluster.remove_peer(&envelope.from);
                info!(
                    "Peer {} left, released {} chunk(s)",
                    envelope.from,
                    released.len()
                );
            }
        }
    }

    async fn after_merge(&self, from: &PeerId, outcome: MergeOutcome) {
        match outcome.target {
            TargetChange::Adopted => {
                if let Some(target) = self.cluster.target() {
                    info!(
                        "Adopted target {} from {} ({})",
                        target.fingerprint,
                        target.creator,
                        target.space.describe()
                    );
                }
            }
            TargetChange::Replaced => {
                info!("Switched to the target of {}, local progress discarded", from);
            }
            TargetChange::Unchanged | TargetChange::Rejected => {}
        }

        for chunk_id in &outcome.aborted {
            info!("Chunk {} taken over by another peer, abandoning it", chunk_id);
        }

        if let Some(search) = self.cluster.target().map(|t| t.key()) {
            for status in outcome.reasserted {
                tracing::debug!("Re-asserting claim on chunk {}", status.chunk_id);
                self.broadcast(GossipMessage::ChunkClaim {
                    search: search.clone(),
                    status,
                })
                .await;
            }
        }

        if !outcome.released.is_empty() {
            tracing::debug!("Released {} stale claim(s)", outcome.released.len());
        }

        if outcome.became_terminal {
            self.on_terminal().await;
        }
    }

    async fn on_terminal(&self) {
        if let Some(found) = self.cluster.found() {
            info!("Search finished: {:?} found by {}", found.candidate, found.finder);
            // Relayed once per peer.
            self.broadcast(GossipMessage::Found(found)).await;
        }
    }

    async fn broadcast_loop(&self) {
        let mut interval = tokio::time::interval(self.timings.gossip_interval());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let renewed = self.cluster.renew_claims();
            if !renewed.is_empty() {
                tracing::trace!("Renewed {} claim(s)", renewed.len());
            }

            if self.cluster.target().is_none() {
                self.broadcast(GossipMessage::Heartbeat).await;
            } else {
                self.broadcast_snapshot().await;
            }
        }
        tracing::debug!("Broadcast loop stopped");
    }

    async fn sweep_loop(&self) {
        let mut interval = tokio::time::interval(self.timings.sweep_interval());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let reclaimed = self.cluster.reclaim_expired(self.timings.reclaim_ttl());
            if !reclaimed.is_empty() {
                info!("Reclaimed {} abandoned chunk(s): {:?}", reclaimed.len(), reclaimed);
            }

            for peer in self.cluster.expire_peers(self.timings.liveness_timeout()) {
                tracing::warn!(
                    "Peer {} silent for over {:?}, dropping it",
                    peer,
                    self.timings.liveness_timeout()
                );
            }
        }
        tracing::debug!("Sweep loop stopped");
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    async fn broadcast_snapshot(&self) {
        for page in self.cluster.snapshot_pages(SNAPSHOT_PAGE) {
            self.broadcast(GossipMessage::Snapshot(page)).await;
        }
    }

    async fn broadcast(&self, message: GossipMessage) {
        let kind = message.kind();
        let envelope = Envelope::new(self.local().clone(), message);
        match envelope.encode() {
            Ok(bytes) => {
                if let Err(e) = self.transport.broadcast(&bytes).await {
                    tracing::warn!("Failed to broadcast {}: {}", kind, e);
                } else {
                    tracing::trace!("Broadcast {} ({} bytes)", kind, bytes.len());
                }
            }
            Err(e) => tracing::error!("Failed to encode {}: {}", kind, e),
        }
    }

    async fn send_to(&self, addr: SocketAddr, message: GossipMessage) {
        let kind = message.kind();
        let envelope = Envelope::new(self.local().clone(), message);
        match envelope.encode() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_to(addr, &bytes).await {
                    tracing::warn!("Failed to send {} to {}: {}", kind, addr, e);
                }
            }
            Err(e) => tracing::error!("Failed to encode {}: {}", kind, e),
        }
    }
}
