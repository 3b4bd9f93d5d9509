//! Coordinator Module
//!
//! Runs the gossip protocol for one peer and exposes the operations workers
//! and the binary need: claim, complete, found, status and the Target
//! lifecycle.
//!
//! ## Background Tasks
//! - **Listener**: decodes every datagram, merges it into the replica and
//!   reacts (re-asserting won claims, relaying a new Found, answering state
//!   requests, releasing the claims of peers that said goodbye).
//! - **Broadcaster**: every gossip interval renews in-flight claims and sends
//!   the replica as Snapshot pages (a Heartbeat while there is no Target).
//! - **Sweeper**: reverts abandoned claims of other peers and drops silent
//!   peers.
//!
//! Sends are fire-and-forget: failures are logged and the next broadcast
//! repairs whatever was lost.

pub mod handlers;
pub mod service;

#[cfg(test)]
mod tests;

pub use handlers::router;
pub use service::Coordinator;
