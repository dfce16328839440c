use std::collections::HashMap;

use super::EvictionPolicy;
use crate::{store::CacheEntry, EstimateSize, Key};

/// Evicts the entry whose value has the smallest size estimate.
///
/// The symmetric counterpart of [`super::LargestPolicy`]: favors keeping the
/// expensive-to-reload large values resident. Ties are broken by the lowest
/// key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallestPolicy;

impl<V: EstimateSize> EvictionPolicy<V> for SmallestPolicy {
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key> {
        keys.iter()
            .filter(|k| entries.contains_key(*k))
            .min_by_key(|&&k| (entries[&k].value.estimated_size(), k))
            .copied()
    }
}
