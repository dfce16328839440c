//! Eviction policy implementations.
//!
//! A policy is consulted by the cache whenever an insertion pushes the store
//! over `max_keys_cached`, and picks exactly one victim. The built-in
//! policies are composed with [`LikelihoodAware`], which narrows the victim
//! pool to the keys the predictor scored lowest before delegating the final
//! choice to the base policy.

use std::collections::HashMap;

use crate::{store::CacheEntry, EstimateSize, Key};

pub mod largest;
pub mod likelihood;
pub mod oldest;
pub mod smallest;

pub use largest::LargestPolicy;
pub use likelihood::LikelihoodAware;
pub use oldest::OldestPolicy;
pub use smallest::SmallestPolicy;

/// Victim selection capability.
///
/// Callers never consult a policy on an empty cache; implementations may
/// therefore return `None` only when handed an empty candidate pool.
pub trait EvictionPolicy<V>: Send + Sync {
    /// Select a victim among `keys`, each of which is present in `entries`.
    /// This is the extension point base policies implement; wrappers use it
    /// to delegate tie-breaking over a narrowed pool.
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key>;

    /// Select a victim from the whole cache. `likelihoods` carries the
    /// predictor scores computed for the access that triggered the eviction;
    /// base policies ignore it.
    fn pick_victim(
        &self,
        entries: &HashMap<Key, CacheEntry<V>>,
        likelihoods: &HashMap<Key, f64>,
    ) -> Option<Key> {
        let _ = likelihoods;
        let keys: Vec<Key> = entries.keys().copied().collect();
        self.pick_among(&keys, entries)
    }
}

impl<V> EvictionPolicy<V> for Box<dyn EvictionPolicy<V>> {
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key> {
        (**self).pick_among(keys, entries)
    }

    fn pick_victim(
        &self,
        entries: &HashMap<Key, CacheEntry<V>>,
        likelihoods: &HashMap<Key, f64>,
    ) -> Option<Key> {
        (**self).pick_victim(entries, likelihoods)
    }
}

/// Enumeration of the built-in eviction policies, for configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// Evict the entry inserted longest ago.
    #[default]
    Oldest,
    /// Evict the entry with the greatest size estimate.
    Largest,
    /// Evict the entry with the smallest size estimate.
    Smallest,
}

impl PolicyKind {
    /// Human-readable name of the policy.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Oldest => "Oldest",
            PolicyKind::Largest => "Largest",
            PolicyKind::Smallest => "Smallest",
        }
    }

    /// Short description of the policy's behavior.
    pub fn description(&self) -> &'static str {
        match self {
            PolicyKind::Oldest => "Evicts the entry with the oldest insertion timestamp",
            PolicyKind::Largest => "Evicts the entry with the largest size estimate",
            PolicyKind::Smallest => "Evicts the entry with the smallest size estimate",
        }
    }

    /// All built-in policies.
    pub fn all() -> &'static [PolicyKind] {
        &[PolicyKind::Oldest, PolicyKind::Largest, PolicyKind::Smallest]
    }
}

/// Create a boxed policy for a [`PolicyKind`].
pub fn create_eviction_policy<V>(kind: PolicyKind) -> Box<dyn EvictionPolicy<V>>
where
    V: EstimateSize + Send + Sync + 'static,
{
    match kind {
        PolicyKind::Oldest => Box::new(OldestPolicy),
        PolicyKind::Largest => Box::new(LargestPolicy),
        PolicyKind::Smallest => Box::new(SmallestPolicy),
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::time::{Duration, Instant};

    use super::*;

    /// Build a cache contents map from `(key, value, age_ticks)` triples,
    /// where a larger tick means an older entry.
    pub fn contents<V>(items: Vec<(Key, V, u64)>) -> HashMap<Key, CacheEntry<V>> {
        let base = Instant::now();
        items
            .into_iter()
            .map(|(key, value, age)| {
                let at = base - Duration::from_millis(age);
                (key, CacheEntry::with_timestamp(value, at))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_properties() {
        assert_eq!(PolicyKind::Oldest.name(), "Oldest");
        assert_eq!(PolicyKind::Largest.name(), "Largest");
        assert_eq!(PolicyKind::Smallest.name(), "Smallest");
        assert!(PolicyKind::Oldest.description().contains("oldest"));
        assert_eq!(PolicyKind::all().len(), 3);
        assert_eq!(PolicyKind::default(), PolicyKind::Oldest);
    }

    #[test]
    fn test_factory_creates_each_kind() {
        for &kind in PolicyKind::all() {
            let policy = create_eviction_policy::<String>(kind);
            let entries = test_util::contents(vec![(1, "a".to_string(), 0)]);
            assert_eq!(policy.pick_victim(&entries, &HashMap::new()), Some(1));
        }
    }
}
