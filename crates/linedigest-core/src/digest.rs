//! Digest algorithms and the native-word → hex unpacker.
//!
//! Backends hand back digests as 32-bit words. SHA-256 words map 1:1 onto
//! the standard state words; SHA-512 state words are 64-bit and arrive as
//! (high, low) 32-bit halves. Rendering every word big-endian in index
//! order reproduces the standard textual digest for both.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest digest supported, in 32-bit words (SHA-512).
pub const MAX_WORDS: usize = 16;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Digest size in native 32-bit words.
    pub const fn word_count(self) -> usize {
        match self {
            Self::Sha256 => 8,
            Self::Sha512 => 16,
        }
    }

    /// Digest size in bytes.
    pub const fn digest_len(self) -> usize {
        self.word_count() * 4
    }

    /// Length of the hex rendering.
    pub const fn hex_len(self) -> usize {
        self.digest_len() * 2
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(format!("unsupported algorithm '{other}' (expected sha256 or sha512)")),
        }
    }
}

/// One record's digest in the backend's native word layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    words: [u32; MAX_WORDS],
}

impl Digest {
    /// Build from native words. Returns `None` if the word count does not
    /// match the algorithm.
    pub fn from_words(algorithm: Algorithm, words: &[u32]) -> Option<Self> {
        if words.len() != algorithm.word_count() {
            return None;
        }
        let mut buf = [0u32; MAX_WORDS];
        buf[..words.len()].copy_from_slice(words);
        Some(Self {
            algorithm,
            words: buf,
        })
    }

    /// Build from the standard big-endian digest bytes.
    pub fn from_be_bytes(algorithm: Algorithm, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != algorithm.digest_len() {
            return None;
        }
        let mut words = [0u32; MAX_WORDS];
        match algorithm {
            Algorithm::Sha256 => {
                for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
                    *w = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            Algorithm::Sha512 => {
                for (pair, chunk) in words.chunks_exact_mut(2).zip(bytes.chunks_exact(8)) {
                    let mut be = [0u8; 8];
                    be.copy_from_slice(chunk);
                    let v = u64::from_be_bytes(be);
                    pair[0] = (v >> 32) as u32;
                    pair[1] = v as u32;
                }
            }
        }
        Some(Self { algorithm, words })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Native words, in index order.
    pub fn words(&self) -> &[u32] {
        &self.words[..self.algorithm.word_count()]
    }

    /// Standard digest bytes: every word big-endian, in index order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words().iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Write the hex form into `out`, which must hold exactly
    /// `algorithm().hex_len()` bytes.
    pub fn write_hex(&self, out: &mut [u8]) -> Result<(), hex::FromHexError> {
        hex::encode_to_slice(self.to_bytes(), out)
    }
}

/// Render a digest as lowercase hex.
pub fn to_hex(digest: &Digest) -> String {
    digest.to_hex()
}

/// Writes the lowercase hex form without allocating.
impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for w in self.words() {
            write!(f, "{w:08x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, self)
    }
}
