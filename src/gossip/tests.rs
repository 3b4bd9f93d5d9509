//! Gossip Module Tests
//!
//! ## Test Scopes
//! - **Codec**: envelopes survive bincode, garbage and oversize are rejected.
//! - **UDP**: real sockets on loopback, peer-list broadcast and address learning.
//! - **Memory**: broadcast fan-out and addressing.

#[cfg(test)]
mod tests {
    use crate::candidate::{LengthRange, SpaceSpec};
    use crate::chunking::ChunkPolicy;
    use crate::cluster::{ChunkState, ChunkStatus, PeerId, Snapshot, Target};
    use crate::fingerprint::DigestAlgorithm;
    use crate::gossip::*;
    use std::time::Duration;

    fn target() -> Target {
        Target {
            fingerprint: DigestAlgorithm::Sha256.fingerprint_of("ab12"),
            algorithm: DigestAlgorithm::Sha256,
            space: SpaceSpec::BruteForce {
                alphabet: "abcdefghijklmnopqrstuvwxyz0123456789".to_string(),
                lengths: LengthRange::new(4, 7).unwrap(),
            },
            policy: ChunkPolicy::default(),
            creator: PeerId::new(),
            created_at: 1,
        }
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope::new(
            PeerId::from("A"),
            GossipMessage::ChunkClaim {
                search: target().key(),
                status: ChunkStatus {
                    chunk_id: 5,
                    state: ChunkState::Claimed,
                    owner: Some(PeerId::from("A")),
                    last_update: 42,
                },
            },
        );

        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.message.kind(), "chunk-claim");
    }

    #[test]
    fn test_full_snapshot_page_fits_a_datagram() {
        let entries = (0..SNAPSHOT_PAGE as u64)
            .map(|id| ChunkStatus {
                chunk_id: id,
                state: ChunkState::Claimed,
                owner: Some(PeerId::new()),
                last_update: u64::MAX,
            })
            .collect();
        let envelope = Envelope::new(
            PeerId::new(),
            GossipMessage::Snapshot(Snapshot {
                target: Some(target()),
                found: None,
                entries,
            }),
        );

        let bytes = envelope.encode().unwrap();

        assert!(bytes.len() <= MAX_DATAGRAM);
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let mut big = target();
        big.space = SpaceSpec::Dictionary {
            words: (0..20_000).map(|i| format!("word-{:08}", i)).collect(),
        };
        let envelope = Envelope::new(
            PeerId::from("A"),
            GossipMessage::Snapshot(Snapshot {
                target: Some(big),
                found: None,
                entries: vec![],
            }),
        );

        assert!(envelope.encode().is_err());
    }

    #[test]
    fn test_target_fit_accounts_for_a_full_page() {
        assert!(ensure_target_fits(&target()).is_ok());

        // fits alone, but not next to a full page of claims
        let mut wide = target();
        wide.space = SpaceSpec::Dictionary {
            words: (0..3_000).map(|i| format!("word-{:08}", i)).collect(),
        };
        let alone = Envelope::new(
            PeerId::from("A"),
            GossipMessage::Snapshot(Snapshot {
                target: Some(wide.clone()),
                found: None,
                entries: vec![],
            }),
        );
        assert!(alone.encode().is_ok());
        assert!(ensure_target_fits(&wide).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Envelope::decode(&[0xff, 0x00, 0x13]).is_err());
        assert!(Envelope::decode(&[]).is_err());
    }

    // ============================================================
    // UDP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_udp_send_and_receive() {
        let timeout = Duration::from_millis(250);
        let a = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers { seeds: vec![] },
            timeout,
        )
        .await
        .unwrap();
        let b = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers { seeds: vec![] },
            timeout,
        )
        .await
        .unwrap();

        a.send_to(b.local_addr(), b"hello").await.unwrap();
        let (payload, src) = tokio::time::timeout(Duration::from_secs(2), b.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(payload, b"hello");
        assert_eq!(src, a.local_addr());
    }

    #[tokio::test]
    async fn test_udp_peer_list_broadcast_learns_peers() {
        let timeout = Duration::from_millis(250);
        let seed = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers { seeds: vec![] },
            timeout,
        )
        .await
        .unwrap();
        let joiner = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers {
                seeds: vec![seed.local_addr()],
            },
            timeout,
        )
        .await
        .unwrap();

        joiner.broadcast(b"join").await.unwrap();
        let (_, src) = tokio::time::timeout(Duration::from_secs(2), seed.recv())
            .await
            .unwrap()
            .unwrap();

        // the seed had no peers; after hearing the joiner it can reach it
        seed.note_peer(src);
        seed.broadcast(b"welcome").await.unwrap();
        let (payload, _) = tokio::time::timeout(Duration::from_secs(2), joiner.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(payload, b"welcome");
    }

    #[tokio::test]
    async fn test_udp_envelope_over_loopback() {
        let timeout = Duration::from_millis(250);
        let a = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers { seeds: vec![] },
            timeout,
        )
        .await
        .unwrap();
        let b = UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Discovery::Peers { seeds: vec![] },
            timeout,
        )
        .await
        .unwrap();
        let envelope = Envelope::new(PeerId::from("A"), GossipMessage::StateRequest);

        a.send_to(b.local_addr(), &envelope.encode().unwrap())
            .await
            .unwrap();
        let (payload, _) = tokio::time::timeout(Duration::from_secs(2), b.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(Envelope::decode(&payload).unwrap(), envelope);
    }

    // ============================================================
    // MEMORY TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_memory_broadcast_skips_sender() {
        let network = MemoryNetwork::new();
        let a = network.join();
        let b = network.join();
        let c = network.join();

        a.broadcast(b"hi").await.unwrap();

        assert_eq!(b.recv().await.unwrap(), (b"hi".to_vec(), a.local_addr()));
        assert_eq!(c.recv().await.unwrap(), (b"hi".to_vec(), a.local_addr()));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), a.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_memory_send_to_disconnected_fails() {
        let network = MemoryNetwork::new();
        let a = network.join();
        let b = network.join();
        assert_eq!(network.len(), 2);

        network.disconnect(b.local_addr());

        assert!(a.send_to(b.local_addr(), b"x").await.is_err());
        assert!(a.broadcast(b"x").await.is_ok());
    }
}
