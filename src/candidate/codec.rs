//! Brute-force codec over an alphabet.
//!
//! For an alphabet of size `B` and a single length `L`, index `i` maps to the
//! base-`B` representation of `i` written with `L` symbols, most significant
//! symbol first. With a range of lengths the space is the concatenation of
//! the per-length blocks in ascending length order.

use super::{CandidateSpace, check_index};
use crate::error::{Result, SwarmError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Inclusive range of candidate lengths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

impl LengthRange {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 {
            return Err(SwarmError::InvalidSpace(
                "candidate length must be at least 1".to_string(),
            ));
        }
        if min > max {
            return Err(SwarmError::InvalidSpace(format!(
                "length range {}..={} is empty",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn exact(length: u32) -> Result<Self> {
        Self::new(length, length)
    }

    pub fn contains(&self, length: u32) -> bool {
        self.min <= length && length <= self.max
    }
}

impl fmt::Display for LengthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}..={}", self.min, self.max)
        }
    }
}

/// One length block of the space.
#[derive(Debug, Clone)]
struct Block {
    length: u32,
    /// `B^length`
    size: u64,
    /// `B^(length - 1)`, the weight of the leading symbol.
    lead_weight: u64,
}

#[derive(Debug, Clone)]
pub struct CandidateCodec {
    symbols: Vec<char>,
    lookup: HashMap<char, u64>,
    lengths: LengthRange,
    blocks: Vec<Block>,
    total: u64,
}

impl CandidateCodec {
    pub fn new(alphabet: &str, lengths: LengthRange) -> Result<Self> {
        let symbols: Vec<char> = alphabet.chars().collect();
        if symbols.is_empty() {
            return Err(SwarmError::InvalidSpace("alphabet is empty".to_string()));
        }

        let mut lookup = HashMap::with_capacity(symbols.len());
        for (digit, symbol) in symbols.iter().enumerate() {
            if lookup.insert(*symbol, digit as u64).is_some() {
                return Err(SwarmError::InvalidSpace(format!(
                    "alphabet repeats symbol {:?}",
                    symbol
                )));
            }
        }

        let base = symbols.len() as u64;
        let mut blocks = Vec::with_capacity((lengths.max - lengths.min + 1) as usize);
        let mut total: u64 = 0;

        for length in lengths.min..=lengths.max {
            let size = base.checked_pow(length).ok_or_else(|| overflow(base, length))?;
            let lead_weight = base.pow(length - 1);
            total = total
                .checked_add(size)
                .ok_or_else(|| overflow(base, length))?;
            blocks.push(Block {
                length,
                size,
                lead_weight,
            });
        }

        Ok(Self {
            symbols,
            lookup,
            lengths,
            blocks,
            total,
        })
    }

    pub fn fixed(alphabet: &str, length: u32) -> Result<Self> {
        Self::new(alphabet, LengthRange::exact(length)?)
    }

    pub fn base(&self) -> u64 {
        self.symbols.len() as u64
    }

    pub fn lengths(&self) -> &LengthRange {
        &self.lengths
    }

    pub fn alphabet(&self) -> String {
        self.symbols.iter().collect()
    }

    /// Finds the length block holding `index` and the offset inside it.
    fn locate(&self, index: u64) -> Result<(&Block, u64)> {
        check_index(index, self.total)?;

        let mut offset = index;
        for block in &self.blocks {
            if offset < block.size {
                return Ok((block, offset));
            }
            offset -= block.size;
        }

        Err(SwarmError::OutOfRange {
            index,
            total: self.total,
        })
    }
}

fn overflow(base: u64, length: u32) -> SwarmError {
    SwarmError::InvalidSpace(format!(
        "space of {} symbols at length {} does not fit in 64 bits",
        base, length
    ))
}

impl CandidateSpace for CandidateCodec {
    fn size(&self) -> u64 {
        self.total
    }

    fn decode(&self, index: u64) -> Result<String> {
        let mut out = String::new();
        self.decode_into(index, &mut out)?;
        Ok(out)
    }

    fn decode_into(&self, index: u64, buf: &mut String) -> Result<()> {
        let (block, mut rest) = self.locate(index)?;
        let base = self.base();

        buf.clear();
        let mut weight = block.lead_weight;
        for _ in 0..block.length {
            let digit = rest / weight;
            rest %= weight;
            buf.push(self.symbols[digit as usize]);
            weight /= base;
        }

        Ok(())
    }

    fn encode(&self, candidate: &str) -> Result<u64> {
        let length = candidate.chars().count() as u32;
        if !self.lengths.contains(length) {
            return Err(SwarmError::InvalidCandidate {
                candidate: candidate.to_string(),
                reason: format!("length {} outside {}", length, self.lengths),
            });
        }

        let base = self.base();
        let mut value: u64 = 0;
        for symbol in candidate.chars() {
            let digit = self
                .lookup
                .get(&symbol)
                .ok_or_else(|| SwarmError::InvalidCandidate {
                    candidate: candidate.to_string(),
                    reason: format!("symbol {:?} not in alphabet", symbol),
                })?;
            value = value * base + digit;
        }

        let preceding: u64 = self
            .blocks
            .iter()
            .take_while(|block| block.length < length)
            .map(|block| block.size)
            .sum();

        Ok(preceding + value)
    }
}
