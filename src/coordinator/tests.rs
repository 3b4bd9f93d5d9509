//! Coordinator Module Tests
//!
//! Multi-peer scenarios over the in-memory network, with real background
//! tasks and short timings.
//!
//! ## Test Scopes
//! - **Target sync**: a joining peer adopts the running search.
//! - **Termination**: a Found reaches the other peer within one interval.
//! - **Races & failures**: lost claims abort, Goodbye and silence free chunks.
//! - **HTTP**: status handlers.

#[cfg(test)]
mod tests {
    use crate::candidate::{LengthRange, SpaceSpec};
    use crate::chunking::ChunkPolicy;
    use crate::cluster::{ChunkState, PeerId, SharedCluster, Target, TargetChange, now_ms};
    use crate::config::Timings;
    use crate::coordinator::{Coordinator, handlers};
    use crate::fingerprint::DigestAlgorithm;
    use crate::gossip::{MemoryNetwork, Transport};
    use axum::{Extension, http::StatusCode};
    use std::sync::Arc;
    use std::time::Duration;

    const GOSSIP_MS: u64 = 50;

    fn fast_timings() -> Timings {
        Timings {
            gossip_interval_ms: GOSSIP_MS,
            sweep_interval_ms: GOSSIP_MS,
            reclaim_ttl_ms: 400,
            liveness_timeout_ms: 300,
            send_timeout_ms: 50,
            sync_wait_ms: 1_000,
            target_poll_ms: 10,
            status_interval_ms: 1_000,
        }
    }

    fn ab12_target(creator: &str) -> Target {
        Target {
            fingerprint: DigestAlgorithm::Sha256.fingerprint_of("ab12"),
            algorithm: DigestAlgorithm::Sha256,
            space: SpaceSpec::BruteForce {
                alphabet: "ab12".to_string(),
                lengths: LengthRange::new(1, 4).unwrap(),
            },
            policy: ChunkPolicy::Fixed { chunk_size: 16 },
            creator: PeerId::from(creator),
            created_at: now_ms(),
        }
    }

    fn node(network: &MemoryNetwork, id: &str) -> Arc<Coordinator> {
        let coordinator = Coordinator::new(
            SharedCluster::with_claim_ttl(PeerId::from(id), fast_timings().reclaim_ttl()),
            Arc::new(network.join()),
            fast_timings(),
        );
        coordinator.start();
        coordinator
    }

    async fn eventually(within: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    // ============================================================
    // TARGET SYNC TESTS
    // ============================================================

    #[tokio::test]
    async fn test_joining_peer_adopts_running_target() {
        // ARRANGE: A is already searching
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let target = ab12_target("A");
        assert_eq!(a.propose_target(target.clone()).await, TargetChange::Adopted);

        // ACT: B joins without a proposal
        let b = node(&network, "B");
        let adopted = b.establish_target(None).await;

        // ASSERT
        assert_eq!(adopted, Some(target));
    }

    #[tokio::test]
    async fn test_no_target_times_out() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");

        let waited = a.wait_for_target(Duration::from_millis(100)).await;

        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn test_competing_proposals_settle_on_smaller_creator() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b = node(&network, "B");

        b.propose_target(ab12_target("B")).await;
        a.propose_target(ab12_target("A")).await;

        let settled = eventually(Duration::from_secs(2), || {
            b.cluster().target().map(|t| t.creator) == Some(PeerId::from("A"))
        })
        .await;
        assert!(settled);
        assert_eq!(a.cluster().target().unwrap().creator, PeerId::from("A"));
    }

    #[tokio::test]
    async fn test_target_too_large_to_gossip_is_not_proposed() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let mut target = ab12_target("A");
        target.space = SpaceSpec::Dictionary {
            words: (0..20_000).map(|i| format!("word-{:08}", i)).collect(),
        };

        let change = a.propose_target(target).await;

        assert_eq!(change, TargetChange::Rejected);
        assert!(a.cluster().target().is_none());
    }

    // ============================================================
    // TERMINATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_found_ab12_stops_other_peer_within_one_interval() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b = node(&network, "B");
        a.propose_target(ab12_target("A")).await;
        assert!(b.wait_for_target(Duration::from_secs(1)).await.is_some());

        // B is working on some chunk when A finds the match in chunk 6
        let b_chunk = b.claim_next_chunk().await.unwrap();
        a.report_found(6, "ab12").await;

        let stopped = eventually(Duration::from_millis(GOSSIP_MS), || b.is_terminal()).await;
        assert!(stopped);
        assert!(b_chunk.token.is_cancelled());

        // B never reports its interrupted chunk as completed
        assert!(!b.report_complete(b_chunk.chunk.id).await);
        assert_ne!(b.cluster().chunk(b_chunk.chunk.id).state, ChunkState::Completed);
        assert_eq!(b.status_snapshot().found.unwrap().candidate, "ab12");
        assert!(b.claim_next_chunk().await.is_none());
    }

    // ============================================================
    // RACE & FAILURE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_announced_claim_aborts_larger_id() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b = node(&network, "B");
        a.propose_target(ab12_target("A")).await;
        assert!(b.wait_for_target(Duration::from_secs(1)).await.is_some());

        // B takes chunk 0 silently, then A announces its own claim on it
        let b_claim = b.cluster().claim_next().unwrap();
        let a_claim = a.claim_next_chunk().await.unwrap();
        assert_eq!((a_claim.chunk.id, b_claim.chunk.id), (0, 0));

        assert!(eventually(Duration::from_secs(1), || b_claim.token.is_cancelled()).await);
        assert!(!a_claim.token.is_cancelled());
        assert!(
            eventually(Duration::from_secs(1), || {
                b.cluster().chunk(0).is_claimed_by(&PeerId::from("A"))
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_goodbye_releases_claims() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b = node(&network, "B");
        a.propose_target(ab12_target("A")).await;
        assert!(b.wait_for_target(Duration::from_secs(1)).await.is_some());

        let b_claim = b.claim_next_chunk().await.unwrap();
        let id = b_claim.chunk.id;
        assert!(
            eventually(Duration::from_secs(1), || {
                a.cluster().chunk(id).is_claimed_by(&PeerId::from("B"))
            })
            .await
        );

        b.shutdown().await;

        assert!(
            eventually(Duration::from_secs(1), || {
                a.cluster().chunk(id).state == ChunkState::Pending
            })
            .await
        );
        assert!(a.status_snapshot().peers.is_empty());
        assert_eq!(a.claim_next_chunk().await.unwrap().chunk.id, id);
    }

    #[tokio::test]
    async fn test_silent_peer_chunk_is_reclaimed() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b_transport = Arc::new(network.join());
        let b_addr = b_transport.local_addr();
        let b = Coordinator::new(
            SharedCluster::with_claim_ttl(PeerId::from("B"), fast_timings().reclaim_ttl()),
            b_transport,
            fast_timings(),
        );
        b.start();
        a.propose_target(ab12_target("A")).await;
        assert!(b.wait_for_target(Duration::from_secs(1)).await.is_some());

        let b_claim = b.claim_next_chunk().await.unwrap();
        let id = b_claim.chunk.id;
        assert!(
            eventually(Duration::from_secs(1), || {
                a.cluster().chunk(id).is_claimed_by(&PeerId::from("B"))
            })
            .await
        );

        // B crashes: no goodbye, no more renewals
        b.shutdown_token().cancel();
        network.disconnect(b_addr);

        assert!(
            eventually(Duration::from_secs(2), || {
                a.cluster().chunk(id).state == ChunkState::Pending
            })
            .await
        );
        assert!(eventually(Duration::from_secs(1), || a.status_snapshot().peers.is_empty()).await);
    }

    #[tokio::test]
    async fn test_live_claim_survives_past_ttl() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let b = node(&network, "B");
        a.propose_target(ab12_target("A")).await;
        assert!(b.wait_for_target(Duration::from_secs(1)).await.is_some());

        let b_claim = b.claim_next_chunk().await.unwrap();
        let ttl = Duration::from_millis(fast_timings().reclaim_ttl_ms);
        tokio::time::sleep(ttl * 3).await;

        assert!(!b_claim.token.is_cancelled());
        assert!(a.cluster().chunk(b_claim.chunk.id).is_claimed_by(&PeerId::from("B")));
    }

    // ============================================================
    // HTTP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_status_handlers() {
        let network = MemoryNetwork::new();
        let a = node(&network, "A");
        let _b = node(&network, "B");
        a.propose_target(ab12_target("A")).await;
        assert!(eventually(Duration::from_secs(1), || a.status_snapshot().peers.len() == 1).await);

        let (code, status) = handlers::handle_status(Extension(a.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(status.0.peer_id, PeerId::from("A"));
        assert_eq!(status.0.total_chunks, 22);

        let (code, peers) = handlers::handle_peers(Extension(a.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(peers.0[0].peer_id, PeerId::from("B"));

        let json = serde_json::to_value(&status.0).unwrap();
        assert_eq!(json["target"]["candidates"], 340);
    }
}
