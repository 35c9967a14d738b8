//! Hash tokens
//!
//! A token is the uppercase-hex form of a truncated cryptographic digest.
//! Canonicalization happens exactly once, at the boundary where raw strings
//! enter the engine; everything downstream carries the typed token.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// A canonical fingerprint hash token.
///
/// Invariant: the inner string is non-empty uppercase hex. Comparisons are
/// therefore case-insensitive with respect to the original input.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashToken(String);

impl HashToken {
    /// Canonicalize a raw hash string. Rejects non-hex input as `BadHash`.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EngineError::BadHash(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Build a token from digest bytes, truncated to `width` hex characters.
    pub fn from_digest(digest: &[u8], width: usize) -> Self {
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{:02X}", byte));
        }
        hex.truncate(width);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashToken({})", self.0)
    }
}

impl TryFrom<String> for HashToken {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HashToken> for String {
    fn from(token: HashToken) -> Self {
        token.0
    }
}
