//! Cluster State Module
//!
//! Each peer holds a full replica of the search state and converges with the
//! others by merging whatever it hears, in any order and any number of times.
//!
//! ## Core Concepts
//! - **Target**: the fingerprint being searched, the candidate space and the
//!   chunk policy. Competing Targets are resolved by the smaller creator id;
//!   the loser discards its progress.
//! - **Chunk table**: one `ChunkStatus` per chunk id. Two entries merge to the
//!   maximum of a total order (completed first, then the newer update, then
//!   claimed over pending, then the smaller owner), so merging is commutative,
//!   associative and idempotent.
//! - **Claim races**: when another peer claims a chunk this peer is searching,
//!   the smaller id keeps it. The loser's cancellation token fires; the winner
//!   re-stamps its claim so it keeps dominating.
//! - **Reclaim**: claims of other peers older than the TTL go back to pending.
//!   A peer never reclaims its own chunk; it renews it instead.
//! - **Termination**: the first verified `Found` cancels the terminal token,
//!   which is the parent of every per-chunk token. It is never cleared.
//!
//! `ClusterState` is plain data with no locking; `SharedCluster` wraps it in a
//! mutex and is what the coordinator and workers share.

pub mod shared;
pub mod state;
pub mod types;


pub use shared::SharedCluster;
pub use state::{ClaimedChunk, ClusterState, MergeOutcome, TargetChange};
pub use types::*;
