//! Error types for the library contracts.
//!
//! Service loops (gossip, coordinator, workers) return `anyhow::Result`; the
//! variants here cover the pure parts of the crate where callers need to match
//! on what went wrong.

use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, SwarmError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwarmError {
    /// An index was outside `[0, total)` of a candidate space.
    #[error("index {index} out of range for space of size {total}")]
    OutOfRange { index: u64, total: u64 },

    /// A candidate space could not be constructed.
    #[error("invalid search space: {0}")]
    InvalidSpace(String),

    /// A chunk plan could not be constructed.
    #[error("invalid chunk plan: {0}")]
    InvalidPlan(String),

    /// A candidate string is not a member of the space.
    #[error("candidate {candidate:?} is not in the space: {reason}")]
    InvalidCandidate { candidate: String, reason: String },

    /// A datagram could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration is malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport could not be set up.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<bincode::Error> for SwarmError {
    fn from(err: bincode::Error) -> Self {
        SwarmError::Codec(err.to_string())
    }
}
