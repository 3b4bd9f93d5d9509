use crate::error::{Result, SwarmError};
use serde::{Deserialize, Serialize};

/// A contiguous range of candidate indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub offset: u64,
    pub length: u64,
}

impl Chunk {
    /// One past the last index covered by the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// How a space is cut into chunks. Must be identical on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkPolicy {
    Fixed { chunk_size: u64 },
    Adaptive { workers: u64 },
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Fixed {
            chunk_size: 1_000_000,
        }
    }
}

impl ChunkPolicy {
    pub fn plan(&self, total: u64) -> Result<ChunkPlan> {
        match *self {
            ChunkPolicy::Fixed { chunk_size } => ChunkPlan::fixed(total, chunk_size),
            ChunkPolicy::Adaptive { workers } => ChunkPlan::even(total, workers),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout {
    Fixed { chunk_size: u64 },
    Even { base: u64, remainder: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total: u64,
    count: u64,
    layout: Layout,
}

impl ChunkPlan {
    pub fn fixed(total: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SwarmError::InvalidPlan(
                "chunk size must be positive".to_string(),
            ));
        }

        Ok(Self {
            total,
            count: total.div_ceil(chunk_size),
            layout: Layout::Fixed { chunk_size },
        })
    }

    pub fn even(total: u64, workers: u64) -> Result<Self> {
        if workers == 0 {
            return Err(SwarmError::InvalidPlan(
                "worker count must be positive".to_string(),
            ));
        }

        let base = total / workers;
        let remainder = total % workers;
        // With fewer indices than workers only `remainder` chunks are non-empty.
        let count = if base > 0 { workers } else { remainder };

        Ok(Self {
            total,
            count,
            layout: Layout::Even { base, remainder },
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn chunk(&self, id: u64) -> Option<Chunk> {
        if id >= self.count {
            return None;
        }

        let (offset, length) = match self.layout {
            Layout::Fixed { chunk_size } => {
                let offset = id * chunk_size;
                (offset, chunk_size.min(self.total - offset))
            }
            Layout::Even { base, remainder } => {
                let extra = u64::from(id < remainder);
                (id * base + id.min(remainder), base + extra)
            }
        };

        Some(Chunk { id, offset, length })
    }

    pub fn iter(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.count).filter_map(move |id| self.chunk(id))
    }
}

/// Fixed-size split of `[0, total)`; the final chunk may be shorter.
pub fn split(total: u64, chunk_size: u64) -> Result<Vec<Chunk>> {
    Ok(ChunkPlan::fixed(total, chunk_size)?.iter().collect())
}

/// Split of `[0, total)` into `workers` near-equal chunks.
pub fn split_even(total: u64, workers: u64) -> Result<Vec<Chunk>> {
    Ok(ChunkPlan::even(total, workers)?.iter().collect())
}
