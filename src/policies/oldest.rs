use std::collections::HashMap;

use super::EvictionPolicy;
use crate::{store::CacheEntry, Key};

/// Evicts the entry with the smallest insertion timestamp.
///
/// Ties between entries inserted at the same instant are broken by the
/// lowest key, which keeps victim selection deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestPolicy;

impl<V> EvictionPolicy<V> for OldestPolicy {
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key> {
        keys.iter()
            .filter(|k| entries.contains_key(*k))
            .min_by_key(|&&k| (entries[&k].inserted_at, k))
            .copied()
    }
}
