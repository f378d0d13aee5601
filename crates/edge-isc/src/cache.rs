//! # Property Cache
//!
//! Time-bounded cache of remote property values.
//!
//! Entries logically expire by ttl comparison; expired entries are
//! removed lazily on read. No background eviction task is required.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

/// Default entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

struct CacheEntry {
    value: Value,
    refreshed: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.refreshed) <= self.ttl
    }
}

/// Cache of property values keyed by name.
pub struct PropertyCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl PropertyCache {
    /// Create a cache with the default entry lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a cache with a custom default entry lifetime.
    #[must_use]
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    /// Cache a value under a name with the default ttl.
    ///
    /// An existing entry is replaced and its timestamp refreshed.
    pub fn cache(&mut self, name: impl Into<String>, value: Value) {
        self.cache_with_ttl(name, value, self.default_ttl);
    }

    /// Cache a value under a name with an explicit ttl.
    pub fn cache_with_ttl(&mut self, name: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.insert(
            name.into(),
            CacheEntry {
                value,
                refreshed: Instant::now(),
                ttl,
            },
        );
    }

    /// Get a cached value if it is still fresh.
    ///
    /// A stale entry is removed and `None` returned.
    pub fn get_cached(&mut self, name: &str) -> Option<Value> {
        let now = Instant::now();
        match self.entries.get(name) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                debug!(name, "Cached entry expired - removing");
                self.entries.remove(name);
                None
            }
            None => None,
        }
    }

    /// True if a fresh entry exists, without touching the cache.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        let now = Instant::now();
        self.entries.get(name).is_some_and(|e| e.is_fresh(now))
    }

    /// Remove an entry regardless of freshness.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name).map(|e| e.value)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, fresh or stale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PropertyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_and_get() {
        let mut cache = PropertyCache::new();
        cache.cache("fixAge", json!(12));
        assert!(cache.is_cached("fixAge"));
        assert_eq!(cache.get_cached("fixAge"), Some(json!(12)));
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let mut cache = PropertyCache::new();
        cache.cache_with_ttl("fixAge", json!(12), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.is_cached("fixAge"));
        assert_eq!(cache.get_cached("fixAge"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_refresh_replaces_entry() {
        let mut cache = PropertyCache::new();
        cache.cache("mode", json!("auto"));
        cache.cache("mode", json!("manual"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_cached("mode"), Some(json!("manual")));
    }

    #[test]
    fn test_clear() {
        let mut cache = PropertyCache::new();
        cache.cache("a", json!(1));
        cache.cache("b", json!(2));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get_cached("a"), None);
    }

    #[test]
    fn test_miss() {
        let mut cache = PropertyCache::new();
        assert_eq!(cache.get_cached("missing"), None);
        assert!(!cache.is_cached("missing"));
    }
}
