//! Time-bounded key/value cache.
//!
//! Entries expire `ttl` after insertion. Expired entries are not dropped
//! on read: [`TtlCache::get_stale`] still returns them, which lets the
//! client fall back to the last known value when the backend is down.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// String-keyed cache with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: HashMap<String, (V, Instant)>,
}

impl<V: Clone> TtlCache<V> {
    /// Empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fresh value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Fresh value for `key` as of `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|(_, stored)| now.saturating_duration_since(*stored) < self.ttl)
            .map(|(value, _)| value.clone())
    }

    /// Value for `key` regardless of age.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|(value, _)| value.clone())
    }

    /// Store `value` under `key`, stamped now.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Store `value` under `key`, stamped `at`.
    pub fn insert_at(&mut self, key: impl Into<String>, value: V, at: Instant) {
        self.entries.insert(key.into(), (value, at));
    }

    /// Drop `key`.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(value, _)| value)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entries_are_returned() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let now = Instant::now();
        cache.insert_at("a", 1, now);
        assert_eq!(cache.get_at("a", now + Duration::from_secs(59)), Some(1));
    }

    #[test]
    fn expired_entries_are_hidden_but_kept_as_stale() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let now = Instant::now();
        cache.insert_at("a", "v".to_string(), now);
        let later = now + Duration::from_secs(60);
        assert_eq!(cache.get_at("a", later), None);
        assert_eq!(cache.get_stale("a").as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get_stale("b"), None);
    }

    #[test]
    fn reinsert_refreshes_timestamp() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("k", 1, t0);
        cache.insert_at("k", 2, t0 + Duration::from_secs(8));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(15)), Some(2));
    }
}
