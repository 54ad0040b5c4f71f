//! In-memory config cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::dump::{self, DumpError};
use crate::model::{CacheKey, RawConfig};
use crate::observability::metrics;

/// Latest known config per key.
///
/// Writes never lower a key's generation. Snapshots are taken under a read
/// lock and processed after it is released.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<CacheKey, Arc<RawConfig>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<RawConfig>> {
        self.entries.read().get(key).cloned()
    }

    /// Store `config` unless a higher generation is already cached.
    ///
    /// Returns true if the entry was written.
    pub fn put(&self, config: Arc<RawConfig>) -> bool {
        let mut entries = self.entries.write();
        if let Some(stored) = entries.get(config.key()) {
            if config.generation() < stored.generation() {
                tracing::debug!(
                    key = %config.key(),
                    stored_generation = stored.generation(),
                    offered_generation = config.generation(),
                    "Ignoring stale config"
                );
                return false;
            }
        }
        entries.insert(config.key().clone(), config);
        metrics::record_cache_entries(entries.len());
        true
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        metrics::record_cache_entries(0);
        tracing::info!(removed, "Cache invalidated");
    }

    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Point-in-time copy of every cached value.
    pub fn values(&self) -> Vec<Arc<RawConfig>> {
        self.entries.read().values().cloned().collect()
    }

    /// Sorted listing lines, optionally including payloads.
    pub fn listing(&self, full: bool) -> Vec<String> {
        let mut lines: Vec<String> = self
            .values()
            .iter()
            .map(|config| config.listing_line(full))
            .collect();
        lines.sort();
        lines
    }

    /// Write a snapshot of the cache to `path`. Returns the record count.
    pub fn dump_to_disk(&self, path: &Path) -> Result<usize, DumpError> {
        let snapshot = self.values();
        dump::write_dump(path, &snapshot)?;
        tracing::info!(path = %path.display(), entries = snapshot.len(), "Cache dumped");
        Ok(snapshot.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::new("cloud.config", "sentinel", "hosts/node1", "")
    }

    fn config(generation: i64, payload: &'static str) -> Arc<RawConfig> {
        Arc::new(RawConfig::new(key(), payload, generation, false))
    }

    #[test]
    fn put_never_regresses() {
        let cache = CacheStore::new();
        assert!(cache.put(config(5, "five")));
        assert!(!cache.put(config(3, "three")));
        assert_eq!(cache.get(&key()).unwrap().generation(), 5);

        assert!(cache.put(config(5, "five again")));
        assert_eq!(cache.get(&key()).unwrap().payload_lossy(), "five again");
    }

    #[test]
    fn one_entry_per_key() {
        let cache = CacheStore::new();
        cache.put(config(1, "a"));
        cache.put(config(2, "b"));
        let lines = cache.listing(false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("cloud.config.sentinel,hosts/node1,2,"));
    }

    #[test]
    fn listing_is_sorted() {
        let cache = CacheStore::new();
        for id in ["c", "a", "b"] {
            let key = CacheKey::new("ns", "cfg", id, "");
            cache.put(Arc::new(RawConfig::new(key, "x", 1, false)));
        }
        let ids: Vec<String> = cache
            .listing(false)
            .iter()
            .map(|line| line.split(',').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = CacheStore::new();
        cache.put(config(1, "a"));
        cache.invalidate_all();
        assert!(cache.is_empty());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
