//! Content-hash cache for converted materials.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use reportflow_shared::{ReportFlowError, Result};

/// Cache file kept inside the conversion directory.
pub const CACHE_FILE_NAME: &str = ".conversion_cache.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    pub hash: String,
}

/// Map from a material's relative path to the hash of its last conversion.
#[derive(Debug, Default)]
pub(crate) struct ConversionCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl ConversionCache {
    /// Load the cache in `dir`; a missing or unreadable file yields an empty cache.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CACHE_FILE_NAME);
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(?path, error = %e, "ignoring corrupt conversion cache");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        debug!(?path, entries = entries.len(), "conversion cache loaded");
        Self { path, entries }
    }

    /// Whether `key` was last converted from content hashing to `hash`.
    pub fn is_fresh(&self, key: &str, hash: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.hash == hash)
    }

    pub fn record(&mut self, key: impl Into<String>, hash: impl Into<String>) {
        self.entries
            .insert(key.into(), CacheEntry { hash: hash.into() });
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| ReportFlowError::parse(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| ReportFlowError::io(&self.path, e))
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let h = content_hash(b"abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn cache_roundtrip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();

        let mut cache = ConversionCache::load(dir.path());
        assert!(!cache.is_fresh("notes.html", "h1"));
        cache.record("notes.html", "h1");
        cache.save().unwrap();

        let reloaded = ConversionCache::load(dir.path());
        assert!(reloaded.is_fresh("notes.html", "h1"));
        assert!(!reloaded.is_fresh("notes.html", "h2"));

        std::fs::write(dir.path().join(CACHE_FILE_NAME), "{not json").unwrap();
        assert!(!ConversionCache::load(dir.path()).is_fresh("notes.html", "h1"));
    }
}
