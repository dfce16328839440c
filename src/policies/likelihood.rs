use std::collections::HashMap;

use super::EvictionPolicy;
use crate::{store::CacheEntry, Key};

/// Wrapper that makes any base policy predictor-aware.
///
/// The victim pool is first narrowed to the cached keys with the minimal
/// likelihood score (absent keys score 0), then the base policy breaks the
/// tie within that pool. When every cached key scores the same — including
/// the empty-likelihoods case of a predictor returning nothing — the pool is
/// the whole cache and the wrapper degenerates to the base policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LikelihoodAware<P> {
    base: P,
}

impl<P> LikelihoodAware<P> {
    pub fn new(base: P) -> Self {
        Self { base }
    }

    /// The wrapped base policy.
    pub fn base(&self) -> &P {
        &self.base
    }
}

impl<V, P> EvictionPolicy<V> for LikelihoodAware<P>
where
    P: EvictionPolicy<V>,
{
    fn pick_among(&self, keys: &[Key], entries: &HashMap<Key, CacheEntry<V>>) -> Option<Key> {
        self.base.pick_among(keys, entries)
    }

    fn pick_victim(
        &self,
        entries: &HashMap<Key, CacheEntry<V>>,
        likelihoods: &HashMap<Key, f64>,
    ) -> Option<Key> {
        if entries.is_empty() {
            return None;
        }
        let score = |k: &Key| likelihoods.get(k).copied().unwrap_or(0.0);
        let min = entries
            .keys()
            .map(score)
            .fold(f64::INFINITY, f64::min);
        let pool: Vec<Key> = entries
            .keys()
            .copied()
            .filter(|k| score(k) == min)
            .collect();
        self.base.pick_among(&pool, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{test_util::contents, OldestPolicy};

    #[test]
    fn test_wrapper_prefers_least_likely_key() {
        // Key 2 is newest but least likely; it goes first.
        let entries = contents(vec![(1, "a", 300), (2, "b", 100)]);
        let likelihoods = HashMap::from([(1, 0.9), (2, 0.1)]);
        let policy = LikelihoodAware::new(OldestPolicy);
        assert_eq!(policy.pick_victim(&entries, &likelihoods), Some(2));
    }

    #[test]
    fn test_unscored_keys_count_as_zero() {
        let entries = contents(vec![(1, "a", 300), (2, "b", 200), (3, "c", 100)]);
        let likelihoods = HashMap::from([(2, 0.9)]);
        let policy = LikelihoodAware::new(OldestPolicy);
        // Keys 1 and 3 both score 0; the base policy picks the older one.
        assert_eq!(policy.pick_victim(&entries, &likelihoods), Some(1));
    }

    #[test]
    fn test_equal_scores_fall_through_to_base_policy() {
        let entries = contents(vec![(1, "a", 100), (2, "b", 300), (3, "c", 200)]);
        let likelihoods = HashMap::from([(1, 0.5), (2, 0.5), (3, 0.5)]);
        let policy = LikelihoodAware::new(OldestPolicy);
        assert_eq!(policy.pick_victim(&entries, &likelihoods), Some(2));
    }

    #[test]
    fn test_empty_likelihoods_degenerate_to_base_policy() {
        let entries = contents(vec![(1, "a", 100), (2, "b", 200)]);
        let policy = LikelihoodAware::new(OldestPolicy);
        assert_eq!(policy.pick_victim(&entries, &HashMap::new()), Some(2));
    }

    #[test]
    fn test_empty_cache_returns_none() {
        let entries = contents::<&str>(vec![]);
        let policy = LikelihoodAware::new(OldestPolicy);
        assert_eq!(policy.pick_victim(&entries, &HashMap::new()), None);
    }
}
