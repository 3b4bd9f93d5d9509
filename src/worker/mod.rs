//! Search Worker Module
//!
//! The CPU-bound part of a peer. `search_range` walks one chunk in index
//! order, fingerprinting each candidate and polling its cancellation token
//! every `poll_interval` candidates. `WorkerPool` drives it on blocking
//! threads and reports results through the coordinator.

pub mod executor;
pub mod search;


pub use executor::{WorkerPool, WorkerState};
pub use search::{ChunkOutcome, SearchRequest, search_range};
