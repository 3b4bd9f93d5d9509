//! Fingerprint functions.
//!
//! The search only needs an equality test between `fingerprint(candidate)`
//! and the Target. The algorithm is named in the Target so every peer hashes
//! the same way.

use crate::error::{Result, SwarmError};

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Trait for fingerprint functions.
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint of raw bytes.
    fn fingerprint(&self, data: &[u8]) -> Vec<u8>;

    /// Whether `candidate` hashes to `target`.
    fn matches(&self, candidate: &str, target: &[u8]) -> bool {
        self.fingerprint(candidate.as_bytes()) == target
    }
}

/// A `Fingerprinter` over any RustCrypto digest.
pub struct DigestFingerprinter<D> {
    _digest: PhantomData<fn() -> D>,
}

impl<D> DigestFingerprinter<D> {
    pub fn new() -> Self {
        Self {
            _digest: PhantomData,
        }
    }
}

impl<D> Default for DigestFingerprinter<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> Fingerprinter for DigestFingerprinter<D> {
    fn fingerprint(&self, data: &[u8]) -> Vec<u8> {
        D::digest(data).to_vec()
    }

    fn matches(&self, candidate: &str, target: &[u8]) -> bool {
        D::digest(candidate.as_bytes()).as_slice() == target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn fingerprinter(&self) -> Box<dyn Fingerprinter> {
        match self {
            DigestAlgorithm::Md5 => Box::new(DigestFingerprinter::<Md5>::new()),
            DigestAlgorithm::Sha1 => Box::new(DigestFingerprinter::<Sha1>::new()),
            DigestAlgorithm::Sha256 => Box::new(DigestFingerprinter::<Sha256>::new()),
            DigestAlgorithm::Sha512 => Box::new(DigestFingerprinter::<Sha512>::new()),
        }
    }

    /// Length in bytes of a fingerprint.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    pub fn fingerprint_of(&self, candidate: &str) -> Fingerprint {
        Fingerprint(self.fingerprinter().fingerprint(candidate.as_bytes()))
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" | "sha-1" => Ok(DigestAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(SwarmError::Config(format!("unknown digest algorithm {}", other))),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Sha1 => write!(f, "sha1"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
            DigestAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

/// Opaque fingerprint bytes; displayed as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<u8>);

impl Fingerprint {
    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s.trim())
            .map(Fingerprint)
            .map_err(|e| SwarmError::Config(format!("invalid hex fingerprint: {}", e)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let fp = DigestAlgorithm::Sha256.fingerprint_of("abc");

        assert_eq!(
            fp.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(fp.as_bytes().len(), DigestAlgorithm::Sha256.output_len());
    }

    #[test]
    fn test_sha1_and_md5_known_vectors() {
        assert_eq!(
            DigestAlgorithm::Sha1.fingerprint_of("abc").to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            DigestAlgorithm::Md5.fingerprint_of("abc").to_hex(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_matches_agrees_with_fingerprint() {
        for algorithm in [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
        ] {
            let target = algorithm.fingerprint_of("ab12");
            let hasher = algorithm.fingerprinter();

            assert!(hasher.matches("ab12", target.as_bytes()));
            assert!(!hasher.matches("ab13", target.as_bytes()));
            assert_eq!(target.as_bytes().len(), algorithm.output_len());
        }
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = DigestAlgorithm::Sha512.fingerprint_of("x");

        let parsed = Fingerprint::from_hex(&fp.to_hex()).unwrap();

        assert_eq!(parsed, fp);
        assert!(Fingerprint::from_hex("zz").is_err());
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("sha-512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert_eq!("SHA-1".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha1);
        assert_eq!("md5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }
}
