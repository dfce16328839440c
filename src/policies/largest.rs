use std::{cmp::Reverse, collections::HashMap};

use super::EvictionPolicy;
use crate::{store::CacheEntry, EstimateSize, Key};

/// Evicts the entry whose value has the greatest size estimate.
///
/// Useful when values vary widely in footprint and freeing the most memory
/// per eviction matters more than recency. Ties are broken by the lowest
/// key.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestPolicy;

impl<V: EstimateSize> EvictionPolicy<V> for LargestPolicy {
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key> {
        keys.iter()
            .filter(|k| entries.contains_key(*k))
            .max_by_key(|&&k| (entries[&k].value.estimated_size(), Reverse(k)))
            .copied()
    }
}
