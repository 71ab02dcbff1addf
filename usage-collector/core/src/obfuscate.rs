//! One-way name hashing for reports that must not reveal cluster, namespace, or node names.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Number of digest bytes kept in an obfuscated name (rendered as twice as many hex chars).
const DIGEST_BYTES: usize = 16;

/// Hashes names with SHA-256, memoizing results for the life of the process.
///
/// The same input always maps to the same output, which keeps report keys stable across resumed
/// runs.
#[derive(Debug, Default)]
pub struct Obfuscator {
    cache: RwLock<HashMap<String, String>>,
}

// === impl Obfuscator ===

impl Obfuscator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn obfuscate(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }

        if let Some(hashed) = self.cache.read().get(name) {
            return hashed.clone();
        }

        let hashed = digest(name);
        self.cache
            .write()
            .entry(name.to_string())
            .or_insert(hashed)
            .clone()
    }

    /// The number of distinct names hashed so far.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

fn digest(name: &str) -> String {
    let sum = Sha256::digest(name.as_bytes());
    hex::encode(&sum[..DIGEST_BYTES])
}
