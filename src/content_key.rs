//! Cache identity of an original asset.
//!
//! The key is the hex SHA-256 of the asset's content hash followed directly by
//! its filename. The content hash is already known to the asset store, so the
//! asset bytes are never re-read to build a key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of an original asset for caching purposes: (content hash, filename).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Derive the key for the given content hash and filename
    pub fn compute(content_hash: &str, filename: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content_hash.as_bytes());
        hasher.update(filename.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
