//! Bounded key/value store and the cache counters.
//!
//! The store itself is not synchronized; the cache wraps it in its single
//! coarse mutex together with the access history and the prefetch queue.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use crate::{CacheStats, Key};

/// A cached value together with its insertion timestamp.
///
/// Entries are created on insertion and never mutated; overwriting a key
/// replaces the whole entry, refreshing the timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create an entry stamped with the current time.
    pub fn new(value: V) -> Self {
        Self::with_timestamp(value, Instant::now())
    }

    /// Create an entry with an explicit timestamp.
    pub fn with_timestamp(value: V, inserted_at: Instant) -> Self {
        Self { value, inserted_at }
    }
}

/// Bounded map from key to entry.
///
/// The store only tracks contents and capacity; victim selection lives in
/// [`crate::policies`] and is driven by the cache, which performs exactly one
/// eviction after any insertion that pushes the store over capacity.
#[derive(Debug)]
pub(crate) struct Store<V> {
    entries: HashMap<Key, CacheEntry<V>>,
    max_keys: usize,
}

impl<V> Store<V> {
    /// `max_keys` must be at least 1; the builder rejects 0.
    pub fn new(max_keys: usize) -> Self {
        debug_assert!(max_keys > 0);
        Self {
            entries: HashMap::with_capacity(max_keys.min(1024)),
            max_keys,
        }
    }

    pub fn lookup(&self, key: Key) -> Option<&CacheEntry<V>> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    /// Insert or overwrite `key`, refreshing its timestamp.
    pub fn insert(&mut self, key: Key, value: V) {
        self.entries.insert(key, CacheEntry::new(value));
    }

    /// Remove `key`. Missing keys are a no-op.
    pub fn evict(&mut self, key: Key) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn over_capacity(&self) -> bool {
        self.entries.len() > self.max_keys
    }

    /// Full view of the current contents, for victim selection.
    pub fn entries(&self) -> &HashMap<Key, CacheEntry<V>> {
        &self.entries
    }

    /// Owned copy of the current contents.
    pub fn snapshot(&self) -> HashMap<Key, (V, Instant)>
    where
        V: Clone,
    {
        self.entries
            .iter()
            .map(|(k, e)| (*k, (e.value.clone(), e.inserted_at)))
            .collect()
    }
}

/// Monotonic cache counters, shared between the request path and the worker.
///
/// Counters are plain atomics so `stats()` never needs the store lock for
/// them; the two gauges of [`CacheStats`] are read from the locked state by
/// the cache when a snapshot is taken.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub prefetch_errors: AtomicU64,
}

impl Metrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch_error(&self) {
        self.prefetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache_keys: usize, active_prefetch_tasks: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            prefetch_errors: self.prefetch_errors.load(Ordering::Relaxed),
            cache_keys,
            active_prefetch_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_timestamps_are_comparable() {
        let a = CacheEntry::new("a");
        let b = CacheEntry::new("b");
        assert!(a.inserted_at <= b.inserted_at);
    }

    #[test]
    fn test_insert_overwrites_and_refreshes_timestamp() {
        let mut store = Store::new(4);
        store.insert(1, "one");
        let first = store.lookup(1).unwrap().inserted_at;
        store.insert(1, "ONE");
        let entry = store.lookup(1).unwrap();
        assert_eq!(entry.value, "ONE");
        assert!(entry.inserted_at >= first);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_missing_key_is_noop() {
        let mut store: Store<&str> = Store::new(2);
        assert!(!store.evict(42));
        store.insert(42, "x");
        assert!(store.evict(42));
        assert!(store.is_empty());
    }

    #[test]
    fn test_over_capacity_flags_only_above_bound() {
        let mut store = Store::new(2);
        store.insert(1, "a");
        store.insert(2, "b");
        assert!(!store.over_capacity());
        store.insert(3, "c");
        assert!(store.over_capacity());
    }

    #[test]
    fn test_snapshot_copies_contents() {
        let mut store = Store::new(4);
        store.insert(1, "a");
        store.insert(2, "b");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&1].0, "a");
        store.evict(1);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_metrics_snapshot_reads_counters() {
        let metrics = Metrics::default();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_miss();
        metrics.record_eviction();
        metrics.record_prefetch_error();
        let stats = metrics.snapshot(3, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.prefetch_errors, 1);
        assert_eq!(stats.cache_keys, 3);
        assert_eq!(stats.active_prefetch_tasks, 1);
    }
}
