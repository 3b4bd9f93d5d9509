//! Chunking Module
//!
//! Splits the index range `[0, total)` of a candidate space into contiguous,
//! non-overlapping work units addressed by a sequential id.
//!
//! ## Core Concepts
//! - **Fixed policy**: every chunk has `chunk_size` indices, the last may be shorter.
//! - **Adaptive policy**: `workers` near-equal chunks, the remainder spread one
//!   extra index at a time over the first chunks. Useful when the space is
//!   small compared to the cluster.
//! - **Determinism**: the policy is part of the cluster Target, so every peer
//!   computes the same plan and chunk ids are comparable across the cluster.
//!
//! Plans are arithmetic: `ChunkPlan::chunk(id)` computes a chunk on demand, so
//! a plan with millions of chunks costs nothing to hold.

pub mod plan;

#[cfg(test)]
mod tests;

pub use plan::{Chunk, ChunkPlan, ChunkPolicy, split, split_even};
