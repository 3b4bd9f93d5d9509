use crate::candidate::SpaceSpec;
use crate::cluster::{ChunkState, ChunkStatus, Found, PeerId, SearchKey, Snapshot, Target, now_ms};
use crate::error::{Result, SwarmError};

use serde::{Deserialize, Serialize};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

/// Chunk entries per Snapshot datagram.
pub const SNAPSHOT_PAGE: usize = 512;

/// The wire protocol between peers.
///
/// - `Heartbeat`: liveness only; lets silent peers be discovered.
/// - `Snapshot`: one page of the sender's replica (Target, found flag, and
///   the non-default chunk entries).
/// - `ChunkClaim` / `ChunkComplete`: a single entry, sent as soon as it
///   changes so races are detected quickly.
/// - `Found`: a match; terminal for the whole cluster.
/// - `StateRequest`: asks the receiver to answer with its full Snapshot.
/// - `Goodbye`: the sender is leaving; its claims can be released.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum GossipMessage {
    Heartbeat,

    Snapshot(Snapshot),

    ChunkClaim {
        search: SearchKey,
        status: ChunkStatus,
    },

    ChunkComplete {
        search: SearchKey,
        status: ChunkStatus,
    },

    Found(Found),

    StateRequest,

    Goodbye,
}

impl GossipMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            GossipMessage::Heartbeat => "heartbeat",
            GossipMessage::Snapshot(_) => "snapshot",
            GossipMessage::ChunkClaim { .. } => "chunk-claim",
            GossipMessage::ChunkComplete { .. } => "chunk-complete",
            GossipMessage::Found(_) => "found",
            GossipMessage::StateRequest => "state-request",
            GossipMessage::Goodbye => "goodbye",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub from: PeerId,
    /// Sender wall clock, milliseconds since the Unix epoch.
    pub sent_at: u64,
    pub message: GossipMessage,
}

impl Envelope {
    pub fn new(from: PeerId, message: GossipMessage) -> Self {
        Self {
            from,
            sent_at: now_ms(),
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(SwarmError::Codec(format!(
                "{} message of {} bytes exceeds a datagram",
                self.message.kind(),
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Fails when a Snapshot page carrying `target` could outgrow a datagram.
/// Every page repeats the Target, so the check assumes the worst page: a full
/// page of claims by UUID-sized peer ids plus a Found with the longest
/// candidate of the space.
pub fn ensure_target_fits(target: &Target) -> Result<()> {
    let peer = PeerId::new();
    let entries = (0..SNAPSHOT_PAGE as u64)
        .map(|chunk_id| ChunkStatus {
            chunk_id,
            state: ChunkState::Claimed,
            owner: Some(peer.clone()),
            last_update: u64::MAX,
        })
        .collect();
    let found = Found {
        candidate: longest_candidate(&target.space),
        finder: peer.clone(),
        chunk_id: u64::MAX,
        fingerprint: target.fingerprint.clone(),
    };
    let page = Envelope::new(
        peer,
        GossipMessage::Snapshot(Snapshot {
            target: Some(target.clone()),
            found: Some(found),
            entries,
        }),
    );

    match page.encode() {
        Ok(_) => Ok(()),
        Err(SwarmError::Codec(_)) => Err(SwarmError::InvalidSpace(format!(
            "{} is too large to share with peers; a snapshot must fit in {} bytes",
            target.space.describe(),
            MAX_DATAGRAM
        ))),
        Err(e) => Err(e),
    }
}

/// Upper bound on a candidate's encoded form, as a placeholder string.
fn longest_candidate(space: &SpaceSpec) -> String {
    match space {
        SpaceSpec::BruteForce { alphabet, lengths } => {
            let widest = alphabet.chars().map(char::len_utf8).max().unwrap_or(1);
            "x".repeat((widest * lengths.max as usize).min(MAX_DATAGRAM))
        }
        SpaceSpec::Mask { pattern } => "x".repeat(pattern.len()),
        SpaceSpec::Dictionary { words } => words
            .iter()
            .max_by_key(|word| word.len())
            .cloned()
            .unwrap_or_default(),
    }
}
