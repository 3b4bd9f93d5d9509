use super::{CandidateSpace, check_index};
use crate::error::{Result, SwarmError};

use std::collections::HashMap;
use std::path::Path;

/// An ordered word list; index `i` is the `i`-th word.
#[derive(Debug, Clone)]
pub struct Dictionary {
    words: Vec<String>,
    positions: HashMap<String, u64>,
}

impl Dictionary {
    pub fn new(words: Vec<String>) -> Result<Self> {
        if words.is_empty() {
            return Err(SwarmError::InvalidSpace("dictionary is empty".to_string()));
        }

        let mut positions = HashMap::with_capacity(words.len());
        for (index, word) in words.iter().enumerate() {
            if positions.insert(word.clone(), index as u64).is_some() {
                return Err(SwarmError::InvalidSpace(format!(
                    "dictionary repeats word {:?}",
                    word
                )));
            }
        }

        Ok(Self { words, positions })
    }

    /// Reads one word per line, skipping blank lines and trimming line endings.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::InvalidSpace(format!("failed to read {}: {}", path.display(), e))
        })?;

        let words = contents
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self::new(words)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl CandidateSpace for Dictionary {
    fn size(&self) -> u64 {
        self.words.len() as u64
    }

    fn decode(&self, index: u64) -> Result<String> {
        check_index(index, self.size())?;
        Ok(self.words[index as usize].clone())
    }

    fn encode(&self, candidate: &str) -> Result<u64> {
        self.positions
            .get(candidate)
            .copied()
            .ok_or_else(|| SwarmError::InvalidCandidate {
                candidate: candidate.to_string(),
                reason: "word not in dictionary".to_string(),
            })
    }
}
