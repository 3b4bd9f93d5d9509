//! Mask patterns.
//!
//! `?l` lowercase, `?u` uppercase, `?d` digit, `?s` punctuation,
//! `?a` letters and digits, `??` a literal `?`. Any other character is a
//! literal. Placeholders form a mixed-radix number, leftmost most significant.

use super::alphabet::{ALNUM, DIGITS, LOWER, PUNCTUATION, UPPER};
use super::{CandidateSpace, check_index};
use crate::error::{Result, SwarmError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Class(Vec<char>),
}

#[derive(Debug, Clone)]
pub struct Mask {
    pattern: String,
    tokens: Vec<Token>,
    /// Weight of each class token, in token order; `None` for literals.
    weights: Vec<Option<u64>>,
    total: u64,
}

fn class(placeholder: char) -> Option<&'static str> {
    match placeholder {
        'l' => Some(LOWER),
        'u' => Some(UPPER),
        'd' => Some(DIGITS),
        's' => Some(PUNCTUATION),
        'a' => Some(ALNUM),
        _ => None,
    }
}

impl Mask {
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            if c != '?' {
                tokens.push(Token::Literal(c));
                continue;
            }
            match chars.next() {
                Some('?') => tokens.push(Token::Literal('?')),
                Some(p) => {
                    let symbols = class(p).ok_or_else(|| {
                        SwarmError::InvalidSpace(format!("unknown mask placeholder ?{}", p))
                    })?;
                    tokens.push(Token::Class(symbols.chars().collect()));
                }
                None => {
                    return Err(SwarmError::InvalidSpace(
                        "mask ends with a dangling '?'".to_string(),
                    ));
                }
            }
        }

        if tokens.is_empty() {
            return Err(SwarmError::InvalidSpace("mask is empty".to_string()));
        }

        // Weights are accumulated right to left.
        let mut weights = vec![None; tokens.len()];
        let mut weight: u64 = 1;
        for (i, token) in tokens.iter().enumerate().rev() {
            if let Token::Class(symbols) = token {
                weights[i] = Some(weight);
                weight = weight.checked_mul(symbols.len() as u64).ok_or_else(|| {
                    SwarmError::InvalidSpace(format!(
                        "mask {} does not fit in 64 bits",
                        pattern
                    ))
                })?;
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            tokens,
            weights,
            total: weight,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl CandidateSpace for Mask {
    fn size(&self) -> u64 {
        self.total
    }

    fn decode(&self, index: u64) -> Result<String> {
        let mut out = String::new();
        self.decode_into(index, &mut out)?;
        Ok(out)
    }

    fn decode_into(&self, index: u64, buf: &mut String) -> Result<()> {
        check_index(index, self.total)?;

        buf.clear();
        let mut rest = index;
        for (token, weight) in self.tokens.iter().zip(&self.weights) {
            match (token, weight) {
                (Token::Class(symbols), Some(weight)) => {
                    let digit = rest / weight;
                    rest %= weight;
                    buf.push(symbols[digit as usize]);
                }
                (Token::Literal(c), _) => buf.push(*c),
                (Token::Class(_), None) => unreachable!("class tokens always carry a weight"),
            }
        }

        Ok(())
    }

    fn encode(&self, candidate: &str) -> Result<u64> {
        let invalid = |reason: String| SwarmError::InvalidCandidate {
            candidate: candidate.to_string(),
            reason,
        };

        let chars: Vec<char> = candidate.chars().collect();
        if chars.len() != self.tokens.len() {
            return Err(invalid(format!(
                "length {} does not match mask {}",
                chars.len(),
                self.pattern
            )));
        }

        let mut index = 0u64;
        for ((c, token), weight) in chars.iter().zip(&self.tokens).zip(&self.weights) {
            match token {
                Token::Literal(expected) if expected == c => {}
                Token::Literal(expected) => {
                    return Err(invalid(format!("expected literal {:?}", expected)));
                }
                Token::Class(symbols) => {
                    let digit = symbols
                        .iter()
                        .position(|s| s == c)
                        .ok_or_else(|| invalid(format!("{:?} not allowed here", c)))?;
                    index += digit as u64 * weight.unwrap_or(1);
                }
            }
        }

        Ok(index)
    }
}
