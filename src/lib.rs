//! Serverless Distributed Hash Search Library
//!
//! Peers on a local network cooperatively search a partitioned candidate
//! space for the preimage of a fingerprint. There is no leader: every peer
//! keeps a full replica of the search state and the replicas converge through
//! gossip. It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`candidate`**: index <-> candidate bijections (brute force, masks,
//!   word lists).
//! - **`chunking`**: deterministic partitioning of an index range into chunks.
//! - **`fingerprint`**: digest algorithms and fingerprint values.
//! - **`cluster`**: the replicated state and its merge rules (claims,
//!   completions, Target tie-break, Found).
//! - **`gossip`**: wire messages and the UDP / in-memory transports.
//! - **`coordinator`**: the per-peer protocol loops and the HTTP status router.
//! - **`worker`**: the chunk search loop and the worker pool.
//! - **`config`** / **`error`**: node configuration and library errors.

pub mod candidate;
pub mod chunking;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod gossip;
pub mod worker;
