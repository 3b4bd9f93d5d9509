//! Candidate Space Module
//!
//! Stateless bijections between an integer index and a candidate string.
//! Every peer decodes the same index to the same candidate, which is what
//! lets a chunk id mean the same work everywhere without shipping candidates
//! over the wire.
//!
//! ## Spaces
//! - **`codec`**: brute force over an alphabet, one length or an ascending
//!   range of lengths (`CandidateCodec`).
//! - **`mask`**: per-position character classes such as `?u?l?l?d`.
//! - **`dictionary`**: an ordered word list.
//! - **`alphabet`**: named symbol sets shared by the CLI and the codec.
//!
//! `SpaceSpec` is the serializable description of a space; it travels inside
//! the cluster Target so joining peers rebuild exactly the same space.

pub mod alphabet;
pub mod codec;
pub mod dictionary;
pub mod mask;


use crate::error::{Result, SwarmError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use codec::{CandidateCodec, LengthRange};
pub use dictionary::Dictionary;
pub use mask::Mask;

/// An indexable, finite set of candidate strings.
pub trait CandidateSpace: Send + Sync {
    /// Number of candidates in the space.
    fn size(&self) -> u64;

    /// Candidate at `index`. Fails with `OutOfRange` when `index >= size()`.
    fn decode(&self, index: u64) -> Result<String>;

    /// Index of `candidate`; the inverse of `decode`.
    fn encode(&self, candidate: &str) -> Result<u64>;

    /// Decodes into a caller-owned buffer so hot loops can reuse one allocation.
    fn decode_into(&self, index: u64, buf: &mut String) -> Result<()> {
        let candidate = self.decode(index)?;
        buf.clear();
        buf.push_str(&candidate);
        Ok(())
    }
}

pub(crate) fn check_index(index: u64, total: u64) -> Result<()> {
    if index >= total {
        return Err(SwarmError::OutOfRange { index, total });
    }
    Ok(())
}

/// Lazy iterator over `[start, start + count)` of a space, clipped to its size.
///
/// Not rewindable; build a new one to restart.
pub struct RangeIterator<'a> {
    space: &'a dyn CandidateSpace,
    next: u64,
    end: u64,
}

impl<'a> RangeIterator<'a> {
    pub fn new(space: &'a dyn CandidateSpace, start: u64, count: u64) -> Self {
        let total = space.size();
        let end = start.saturating_add(count).min(total);
        Self {
            space,
            next: start.min(end),
            end,
        }
    }

    /// Candidates still to be produced.
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }
}

impl Iterator for RangeIterator<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next;
        self.next += 1;
        self.space.decode(index).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Serializable description of a candidate space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceSpec {
    BruteForce {
        alphabet: String,
        lengths: LengthRange,
    },
    Mask {
        pattern: String,
    },
    /// Word lists travel inside gossip datagrams, so keep them small.
    Dictionary {
        words: Vec<String>,
    },
}

impl SpaceSpec {
    pub fn build(&self) -> Result<Arc<dyn CandidateSpace>> {
        Ok(match self {
            SpaceSpec::BruteForce { alphabet, lengths } => {
                Arc::new(CandidateCodec::new(alphabet, lengths.clone())?)
            }
            SpaceSpec::Mask { pattern } => Arc::new(Mask::parse(pattern)?),
            SpaceSpec::Dictionary { words } => Arc::new(Dictionary::new(words.clone())?),
        })
    }

    /// Short human-readable form for logs and the status endpoint.
    pub fn describe(&self) -> String {
        match self {
            SpaceSpec::BruteForce { alphabet, lengths } => {
                format!(
                    "brute-force {} symbols, length {}",
                    alphabet.chars().count(),
                    lengths
                )
            }
            SpaceSpec::Mask { pattern } => format!("mask {}", pattern),
            SpaceSpec::Dictionary { words } => format!("dictionary of {} words", words.len()),
        }
    }
}
