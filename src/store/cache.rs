//! Definition cache contract and the in-process implementation
//!
//! The store is cache-aside: `load` consults the cache first, `save` deletes
//! the key only after a successful commit. The cache sees opaque bytes; TTL
//! expiry is the only freshness mechanism (no invalidation broadcast), so
//! readers tolerate at most one TTL of staleness.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Byte-oriented cache with TTL, as exposed by the cache collaborator
pub trait DefinitionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    fn delete(&self, key: &str);
}

/// In-process cache over a locked map
///
/// An explicitly constructed instance with its own lifecycle, not
/// process-wide ambient state.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .expect("cache lock poisoned")
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DefinitionCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        let (bytes, expires) = entries.get(key)?;
        if *expires <= Instant::now() {
            return None;
        }
        Some(bytes.clone())
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    fn delete(&self, key: &str) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_round_trip() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));

        cache.delete("k");
        assert_eq!(cache.get("k"), None);
        // Deleting again is a harmless no-op
        cache.delete("k");
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(0));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }
}
