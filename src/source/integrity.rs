//! Hashing and integrity verification
//!
//! Declared digests come from the lock file; every declared algorithm must
//! match the fetched bytes before they are handed to the cache or installer.

use crate::error::IntegrityError;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a lock file algorithm name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Length of the hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Hex digest of `data`
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => sha256_hex(data),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Short, stable directory name for a URL (first 8 bytes of SHA-256)
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Check `data` against every declared hash and the optional declared size.
pub fn verify(
    data: &[u8],
    hashes: &BTreeMap<String, String>,
    size: Option<u64>,
) -> Result<(), IntegrityError> {
    if let Some(expected) = size {
        let actual = data.len() as u64;
        if actual != expected {
            return Err(IntegrityError::SizeMismatch { expected, actual });
        }
    }

    for (name, expected) in hashes {
        let algorithm = HashAlgorithm::parse(name)
            .ok_or_else(|| IntegrityError::UnsupportedAlgorithm(name.clone()))?;
        let actual = algorithm.digest(data);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(IntegrityError::HashMismatch {
                algorithm: name.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    Ok(())
}
