//! Content fingerprints for stored records

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multibase-style prefix marking a lowercase hex digest
const PREFIX: char = 'b';

/// SHA-256 fingerprint of a record value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{}{:x}", PREFIX, hash))
    }

    /// Compute a fingerprint from a JSON value
    ///
    /// `serde_json` objects keep their keys sorted, so equal values always
    /// encode to the same bytes regardless of insertion order.
    pub fn of(value: &serde_json::Value) -> Self {
        Self::from_bytes(value.to_string().as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `value` hashes to this fingerprint
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        *self == Self::of(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
