//! Gossip Module
//!
//! The wire protocol and the datagram transports peers use to exchange it.
//!
//! ## Core Concepts
//! - **Envelope**: every datagram is one bincode-encoded `Envelope`
//!   `(from, sent_at, message)`. Anything that fails to decode is dropped.
//! - **Unreliable delivery**: datagrams may be lost, duplicated or reordered.
//!   Nothing here retries; the periodic Snapshot broadcast repairs gaps and
//!   the cluster merge tolerates repeats.
//! - **Transports**: `UdpTransport` (multicast group, subnet broadcast or an
//!   explicit peer list) and `MemoryTransport` for in-process clusters.

pub mod memory;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use transport::{Discovery, Transport, UdpTransport};
pub use types::{Envelope, GossipMessage, MAX_DATAGRAM, SNAPSHOT_PAGE, ensure_target_fits};
