//! Presage is a predictive prefetching cache for keyed, loadable datasets.
//!
//! A client walks through a dataset whose items are identified by integer
//! keys (typically frame indices of a time-ordered recording). Every access
//! goes through [`PresageCache::get`], which returns the value synchronously;
//! in the background a worker thread speculatively loads the items an
//! [`AccessPredictor`] considers most likely to be requested next, so that
//! the following accesses are cache hits.
//!
//! The crate is built from three pluggable capabilities:
//!
//! - [`DataProvider`]: loads a value for a key and enumerates available keys.
//! - [`AccessPredictor`]: maps `(current, history)` to per-key likelihood
//!   scores.
//! - [`policies::EvictionPolicy`]: selects a victim when the cache is over
//!   capacity. The built-in policies are wrapped by
//!   [`policies::LikelihoodAware`], which prefers to evict the keys the
//!   predictor considers least likely to be needed.
//!
//! ```no_run
//! use presage::prelude::*;
//!
//! let provider = MotDataProvider::open("detections.txt", 100)?;
//! let predictor = DynamicPredictor::new([-15, -5, -1, 1, 5, 15]);
//! let cache = CacheBuilder::new(provider, predictor)
//!     .max_keys_cached(200)
//!     .max_keys_prefetched(16)
//!     .build()?;
//!
//! let frame = cache.get(42)?;
//! println!("frame {} has {} detections", frame.frame_number, frame.detections.len());
//! println!("{:?}", cache.stats());
//! cache.close();
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use thiserror::Error;

pub mod cache;
pub mod policies;
pub mod predict;
pub mod providers;
pub mod scheduler;
pub mod store;

mod worker;

pub use cache::{CacheBuilder, PresageCache};
pub use store::CacheEntry;

/// Key identifying a cacheable item. Keys are ordered and distances between
/// them are meaningful to predictors, but opaque to the cache itself.
pub type Key = i64;

/// Errors carried across the provider boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source of values for the cache.
///
/// `load` is assumed blocking and potentially slow; the cache calls it on the
/// requesting thread for synchronous misses and on its worker thread for
/// prefetches, never while holding internal locks.
pub trait DataProvider: Send + Sync + 'static {
    /// Payload type produced for each key.
    type Value: Clone + EstimateSize + Send + Sync + 'static;

    /// Load the value for `key`. Errors propagate to the caller on a
    /// synchronous miss and are swallowed (and counted) on prefetch.
    fn load(&self, key: Key) -> Result<Self::Value, BoxError>;

    /// Snapshot of the keys this provider can serve.
    fn available_keys(&self) -> HashSet<Key>;

    /// Number of available keys.
    fn total_keys(&self) -> usize;

    /// Optional diagnostic counters.
    fn stats(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

/// Predicts which keys are likely to be accessed next.
///
/// Implementations must be pure and cheap relative to a provider load: the
/// cache invokes `likelihoods` on every `get`. Scores are non-negative and
/// need not be normalized; higher means more probable. The cache drops
/// non-finite and non-positive scores, so a misbehaving predictor degrades
/// to "no predictions" rather than breaking the request path.
pub trait AccessPredictor: Send + Sync + 'static {
    /// Score candidate keys given the current key and the recent access
    /// history (bounded, newest last).
    fn likelihoods(&self, current: Key, history: &[Key]) -> HashMap<Key, f64>;
}

/// Cheap size estimate for cached values, used by size-based eviction
/// policies. Estimates may be approximate but must be non-negative and
/// stable across reads of the same value.
pub trait EstimateSize {
    fn estimated_size(&self) -> usize;
}

impl EstimateSize for String {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for &str {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for Vec<u8> {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

macro_rules! impl_estimate_size_for_primitive {
    ($($ty:ty),*) => {
        $(
            impl EstimateSize for $ty {
                fn estimated_size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_estimate_size_for_primitive!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

/// Errors surfaced by the cache's public operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `get` was called after `close`.
    #[error("cache is closed")]
    Closed,

    /// The provider failed a synchronous load. The miss is still counted and
    /// the store is left unchanged.
    #[error("failed to load key {key}")]
    Load {
        key: Key,
        #[source]
        source: BoxError,
    },

    /// A constructor option was rejected.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// The prefetch worker thread could not be spawned.
    #[error("failed to spawn prefetch worker")]
    Spawn(#[source] std::io::Error),
}

/// Notifications emitted by the cache when an `on_event` callback is
/// configured.
///
/// Callbacks run synchronously on whichever thread triggered the event (the
/// caller of `get` or the prefetch worker) after internal locks have been
/// released. Re-entering the cache from a callback is safe but the callback
/// should stay cheap: it sits on the request path.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A synchronous miss is about to call the provider.
    LoadStart { key: Key },
    /// A synchronous load finished successfully.
    LoadComplete { key: Key, duration: Duration },
    /// An entry was evicted to respect the cache bound.
    Evict { key: Key },
    /// A key was added to the prefetch queue.
    PrefetchEnqueued { key: Key },
    /// The worker loaded and inserted a prefetched key.
    PrefetchSuccess { key: Key, duration: Duration },
    /// The provider failed a prefetch load; the worker carries on.
    PrefetchError { key: Key },
}

impl CacheEvent {
    /// Stable event name, useful for dispatching or logging.
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::LoadStart { .. } => "cache_load_start",
            CacheEvent::LoadComplete { .. } => "cache_load_complete",
            CacheEvent::Evict { .. } => "cache_evict",
            CacheEvent::PrefetchEnqueued { .. } => "prefetch_enqueued",
            CacheEvent::PrefetchSuccess { .. } => "prefetch_success",
            CacheEvent::PrefetchError { .. } => "prefetch_error",
        }
    }

    /// The key the event refers to.
    pub fn key(&self) -> Key {
        match self {
            CacheEvent::LoadStart { key }
            | CacheEvent::LoadComplete { key, .. }
            | CacheEvent::Evict { key }
            | CacheEvent::PrefetchEnqueued { key }
            | CacheEvent::PrefetchSuccess { key, .. }
            | CacheEvent::PrefetchError { key } => *key,
        }
    }
}

/// Snapshot of cache counters and gauges.
///
/// Counters are monotonic over the cache's lifetime; gauges reflect the
/// moment the snapshot was taken. No atomicity is guaranteed across fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub prefetch_errors: u64,
    /// Number of keys currently cached.
    pub cache_keys: usize,
    /// Current prefetch queue depth.
    pub active_prefetch_tasks: usize,
}

impl CacheStats {
    /// Ratio of hits to total completed lookups.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// Convenient re-exports for common types and modules
pub mod prelude {
    pub use super::{
        cache::{CacheBuilder, PresageCache},
        policies::{LikelihoodAware, PolicyKind},
        predict::{DistanceDecayPredictor, DynamicPredictor, NullPredictor},
        providers::{MotDataProvider, MotDetection, MotFrame},
        store::CacheEntry,
        AccessPredictor, BoxError, CacheError, CacheEvent, CacheStats, DataProvider,
        EstimateSize, Key,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_ratio() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_event_names_are_stable() {
        let events = [
            CacheEvent::LoadStart { key: 1 },
            CacheEvent::LoadComplete { key: 1, duration: Duration::ZERO },
            CacheEvent::Evict { key: 1 },
            CacheEvent::PrefetchEnqueued { key: 1 },
            CacheEvent::PrefetchSuccess { key: 1, duration: Duration::ZERO },
            CacheEvent::PrefetchError { key: 1 },
        ];
        let names: Vec<_> = events.iter().map(CacheEvent::name).collect();
        assert_eq!(
            names,
            [
                "cache_load_start",
                "cache_load_complete",
                "cache_evict",
                "prefetch_enqueued",
                "prefetch_success",
                "prefetch_error",
            ]
        );
        assert!(events.iter().all(|e| e.key() == 1));
    }

    #[test]
    fn test_estimate_size_is_stable() {
        let value = "hello".to_string();
        assert_eq!(value.estimated_size(), 5);
        assert_eq!(value.estimated_size(), 5);
        assert_eq!(7_i64.estimated_size(), 8);
    }
}
