use crate::candidate::SpaceSpec;
use crate::chunking::ChunkPolicy;
use crate::fingerprint::{DigestAlgorithm, Fingerprint};

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Identity of a peer. The total order on ids (lexicographic) is the
/// cluster-wide tie-break: the smaller id wins target and claim conflicts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Pending,
    Claimed,
    Completed,
}

impl ChunkState {
    fn rank(self) -> u8 {
        match self {
            ChunkState::Pending => 0,
            ChunkState::Claimed => 1,
            ChunkState::Completed => 2,
        }
    }
}

/// Replicated status of one chunk.
///
/// A chunk without an entry is `Pending` with no owner and `last_update == 0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkStatus {
    pub chunk_id: u64,
    pub state: ChunkState,
    pub owner: Option<PeerId>,
    /// Milliseconds since the Unix epoch.
    pub last_update: u64,
}

impl ChunkStatus {
    pub fn pending(chunk_id: u64) -> Self {
        Self {
            chunk_id,
            state: ChunkState::Pending,
            owner: None,
            last_update: 0,
        }
    }

    pub fn is_default(&self) -> bool {
        self.state == ChunkState::Pending && self.owner.is_none() && self.last_update == 0
    }

    pub fn is_claimed_by(&self, peer: &PeerId) -> bool {
        self.state == ChunkState::Claimed && self.owner.as_ref() == Some(peer)
    }

    /// Position of this entry in the merge order. Completed beats everything,
    /// then the newer update, then claimed over pending, then the smaller owner.
    fn merge_key(&self) -> (bool, u64, u8, Option<Reverse<&PeerId>>) {
        (
            self.state == ChunkState::Completed,
            self.last_update,
            self.state.rank(),
            self.owner.as_ref().map(Reverse),
        )
    }

    /// Whether `self` wins over `other` in a merge. The order is total, so the
    /// merge is a plain `max` and therefore commutative, associative and
    /// idempotent.
    pub fn dominates(&self, other: &ChunkStatus) -> bool {
        self.merge_key() > other.merge_key()
    }
}

/// Identifies one search: the creator and creation time of its Target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub creator: PeerId,
    pub created_at: u64,
}

/// What the cluster is looking for and how the space is cut.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub fingerprint: Fingerprint,
    pub algorithm: DigestAlgorithm,
    pub space: SpaceSpec,
    pub policy: ChunkPolicy,
    pub creator: PeerId,
    pub created_at: u64,
}

impl Target {
    pub fn key(&self) -> SearchKey {
        SearchKey {
            creator: self.creator.clone(),
            created_at: self.created_at,
        }
    }

    /// Tie-break between competing Targets: the smaller creator id wins;
    /// the creation time and fingerprint only matter for a creator that
    /// proposed twice.
    pub fn beats(&self, other: &Target) -> bool {
        (&self.creator, self.created_at, self.fingerprint.as_bytes())
            < (&other.creator, other.created_at, other.fingerprint.as_bytes())
    }
}

/// A matching candidate. Its presence is the terminal flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Found {
    pub candidate: String,
    pub finder: PeerId,
    pub chunk_id: u64,
    pub fingerprint: Fingerprint,
}

impl Found {
    /// Deterministic choice between two reports of a match.
    pub fn precedes(&self, other: &Found) -> bool {
        (&self.candidate, &self.finder) < (&other.candidate, &other.finder)
    }
}

/// One page of replicated state. Pages carry the Target and the found flag so
/// each one can be merged on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub target: Option<Target>,
    pub found: Option<Found>,
    pub entries: Vec<ChunkStatus>,
}

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

// ----------------------------------------------------------------------
// Status views
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSummary {
    pub fingerprint: String,
    pub algorithm: DigestAlgorithm,
    pub creator: PeerId,
    pub created_at: u64,
    pub space: String,
    pub candidates: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerView {
    pub peer_id: PeerId,
    pub addr: SocketAddr,
    pub seen_ms_ago: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub peer_id: PeerId,
    pub target: Option<TargetSummary>,
    pub total_chunks: u64,
    pub pending: u64,
    pub claimed: u64,
    pub completed: u64,
    pub in_flight: Vec<u64>,
    pub claims: Vec<(u64, PeerId)>,
    pub peers: Vec<PeerView>,
    pub found: Option<Found>,
    pub terminal: bool,
}

impl StatusSnapshot {
    /// Every chunk completed without a match.
    pub fn exhausted(&self) -> bool {
        self.target.is_some() && self.total_chunks > 0 && self.completed == self.total_chunks
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
