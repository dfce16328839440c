//! The public cache: builder, request path, stats and shutdown.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Instant,
};

use parking_lot::{Condvar, Mutex};

use crate::{
    policies::{create_eviction_policy, EvictionPolicy, LikelihoodAware, PolicyKind},
    scheduler::{self, PrefetchQueue},
    store::{Metrics, Store},
    worker, AccessPredictor, CacheError, CacheEvent, CacheStats, DataProvider, EstimateSize, Key,
};

const DEFAULT_MAX_KEYS_CACHED: usize = 200;
const DEFAULT_MAX_KEYS_PREFETCHED: usize = 16;
const DEFAULT_HISTORY_SIZE: usize = 10;

type EventCallback = Box<dyn Fn(&CacheEvent) + Send + Sync + 'static>;

/// Configures and constructs a [`PresageCache`].
///
/// ```no_run
/// # use presage::prelude::*;
/// # let provider = MotDataProvider::open("detections.txt", 100)?;
/// let cache = CacheBuilder::new(provider, DynamicPredictor::new([1, 5]))
///     .max_keys_cached(500)
///     .max_keys_prefetched(8)
///     .history_size(20)
///     .eviction_policy(PolicyKind::Largest)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub struct CacheBuilder<P, A> {
    provider: P,
    predictor: A,
    max_keys_cached: usize,
    max_keys_prefetched: usize,
    history_size: usize,
    policy: PolicyKind,
    on_event: Option<EventCallback>,
}

impl<P, A> CacheBuilder<P, A>
where
    P: DataProvider,
    A: AccessPredictor,
{
    pub fn new(provider: P, predictor: A) -> Self {
        Self {
            provider,
            predictor,
            max_keys_cached: DEFAULT_MAX_KEYS_CACHED,
            max_keys_prefetched: DEFAULT_MAX_KEYS_PREFETCHED,
            history_size: DEFAULT_HISTORY_SIZE,
            policy: PolicyKind::default(),
            on_event: None,
        }
    }

    /// Maximum number of cached keys. Must be at least 1.
    pub fn max_keys_cached(mut self, max_keys_cached: usize) -> Self {
        self.max_keys_cached = max_keys_cached;
        self
    }

    /// Maximum prefetch queue depth. 0 disables prefetching entirely and
    /// reduces the cache to demand paging.
    pub fn max_keys_prefetched(mut self, max_keys_prefetched: usize) -> Self {
        self.max_keys_prefetched = max_keys_prefetched;
        self
    }

    /// How many recent accesses are kept for the predictor. Must be at
    /// least 1.
    pub fn history_size(mut self, history_size: usize) -> Self {
        self.history_size = history_size;
        self
    }

    /// Base eviction policy; it is always wrapped by
    /// [`LikelihoodAware`](crate::policies::LikelihoodAware).
    pub fn eviction_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Observer for cache events. Called synchronously on whichever thread
    /// triggers the event; keep it cheap.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Validate the configuration, start the prefetch worker and hand back
    /// the cache.
    pub fn build(self) -> Result<PresageCache<P, A>, CacheError> {
        if self.max_keys_cached == 0 {
            return Err(CacheError::Config("max_keys_cached must be at least 1"));
        }
        if self.history_size == 0 {
            return Err(CacheError::Config("history_size must be at least 1"));
        }

        let inner = Arc::new(Inner {
            provider: self.provider,
            predictor: self.predictor,
            policy: LikelihoodAware::new(create_eviction_policy(self.policy)),
            state: Mutex::new(State {
                store: Store::new(self.max_keys_cached),
                history: VecDeque::with_capacity(self.history_size),
                queue: PrefetchQueue::new(self.max_keys_prefetched),
                likelihoods: HashMap::new(),
                last_position: None,
                in_flight: None,
            }),
            queue_signal: Condvar::new(),
            metrics: Metrics::default(),
            shutdown: AtomicBool::new(false),
            on_event: self.on_event,
            history_size: self.history_size,
        });

        let handle = std::thread::Builder::new()
            .name("presage-prefetch".to_string())
            .spawn({
                let inner = Arc::clone(&inner);
                move || worker::run(inner)
            })
            .map_err(CacheError::Spawn)?;

        tracing::debug!(
            max_keys_cached = self.max_keys_cached,
            max_keys_prefetched = self.max_keys_prefetched,
            history_size = self.history_size,
            policy = self.policy.name(),
            "cache started"
        );

        Ok(PresageCache {
            inner,
            worker: Mutex::new(Some(handle)),
        })
    }
}

/// Everything the request path and the worker share. All mutable pieces sit
/// behind the single `state` mutex; counters are atomics so stats reads stay
/// cheap.
pub(crate) struct Inner<P: DataProvider, A: AccessPredictor> {
    pub(crate) provider: P,
    pub(crate) predictor: A,
    pub(crate) policy: LikelihoodAware<Box<dyn EvictionPolicy<P::Value>>>,
    pub(crate) state: Mutex<State<P::Value>>,
    pub(crate) queue_signal: Condvar,
    pub(crate) metrics: Metrics,
    pub(crate) shutdown: AtomicBool,
    on_event: Option<EventCallback>,
    history_size: usize,
}

impl<P: DataProvider, A: AccessPredictor> Inner<P, A> {
    /// Dispatch an event to the configured observer. Never called while a
    /// lock is held.
    pub(crate) fn emit(&self, event: CacheEvent) {
        if let Some(callback) = &self.on_event {
            callback(&event);
        }
    }
}

/// State guarded by the store mutex: the bounded store, the access history,
/// the prefetch queue and the scores of the most recent prediction.
pub(crate) struct State<V> {
    pub(crate) store: Store<V>,
    pub(crate) history: VecDeque<Key>,
    pub(crate) queue: PrefetchQueue,
    pub(crate) likelihoods: HashMap<Key, f64>,
    pub(crate) last_position: Option<Key>,
    pub(crate) in_flight: Option<Key>,
}

impl<V: EstimateSize> State<V> {
    /// Insert `key` and, if the store went over capacity, evict exactly one
    /// victim chosen by the policy. The inserted key itself is scored as
    /// certain so it cannot be the victim while other entries exist.
    pub(crate) fn insert_bounded(
        &mut self,
        key: Key,
        value: V,
        policy: &impl EvictionPolicy<V>,
        metrics: &Metrics,
    ) -> Option<Key> {
        self.store.insert(key, value);
        if !self.store.over_capacity() {
            return None;
        }
        let mut scores = self.likelihoods.clone();
        scores.insert(key, f64::INFINITY);
        let victim = policy.pick_victim(self.store.entries(), &scores)?;
        self.store.evict(victim);
        metrics.record_eviction();
        Some(victim)
    }
}

/// A dynamic prefetching cache.
///
/// `get` returns values synchronously, loading through the provider on a
/// miss; a background worker keeps the cache populated with the keys the
/// predictor scores highest. Cloning values out of the cache is assumed
/// cheap — wrap large payloads in `Arc` if it is not.
///
/// All methods take `&self`; the cache is safe to share across threads.
/// Dropping the cache closes it, joining the worker thread.
pub struct PresageCache<P: DataProvider, A: AccessPredictor> {
    inner: Arc<Inner<P, A>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P, A> PresageCache<P, A>
where
    P: DataProvider,
    A: AccessPredictor,
{
    /// Shorthand for [`CacheBuilder::new`] with default options.
    pub fn new(provider: P, predictor: A) -> Result<Self, CacheError> {
        CacheBuilder::new(provider, predictor).build()
    }

    /// Fetch the value for `key`.
    ///
    /// On a hit the value is returned straight from the store. On a miss the
    /// provider is called on this thread and the result is cached, evicting
    /// a victim if the cache is full. Either way the access is recorded in
    /// the history and the prefetch queue is reconciled against fresh
    /// predictor scores before returning.
    pub fn get(&self, key: Key) -> Result<P::Value, CacheError> {
        let (cached, history, last_position) = {
            let mut state = self.inner.state.lock();
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(CacheError::Closed);
            }
            if state.history.len() == self.inner.history_size {
                state.history.pop_front();
            }
            state.history.push_back(key);
            let last_position = state.last_position.replace(key);
            let cached = state.store.lookup(key).map(|entry| entry.value.clone());
            (
                cached,
                state.history.iter().copied().collect::<Vec<Key>>(),
                last_position,
            )
        };

        if let Some(value) = cached {
            self.inner.metrics.record_hit();
            tracing::trace!(key, "cache hit");
            self.reconcile(key, &history, last_position, None);
            return Ok(value);
        }

        self.inner.metrics.record_miss();
        tracing::debug!(key, "cache miss, loading synchronously");
        self.inner.emit(CacheEvent::LoadStart { key });
        let started = Instant::now();
        let value = self
            .inner
            .provider
            .load(key)
            .map_err(|source| CacheError::Load { key, source })?;
        self.inner.emit(CacheEvent::LoadComplete {
            key,
            duration: started.elapsed(),
        });

        self.reconcile(key, &history, last_position, Some(value.clone()));
        Ok(value)
    }

    /// Snapshot of counters and gauges.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        self.inner
            .metrics
            .snapshot(state.store.len(), state.queue.len())
    }

    /// Owned copy of the current cache contents with insertion timestamps.
    pub fn snapshot(&self) -> HashMap<Key, (P::Value, Instant)> {
        self.inner.state.lock().store.snapshot()
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Shut the cache down: abandon queued prefetches, wake the worker and
    /// join it. An in-flight provider load is allowed to finish; its result
    /// is discarded. Repeated calls are no-ops, and `get` fails with
    /// [`CacheError::Closed`] afterwards.
    pub fn close(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.state.lock().queue.clear();
        self.inner.queue_signal.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        tracing::debug!("cache closed");
    }

    /// Recompute predictions for `current`, optionally insert a freshly
    /// loaded value (evicting if needed), and bring the prefetch queue in
    /// line. Runs on the calling thread; the store lock is held only for
    /// the mutation itself, and events fire after it is released.
    fn reconcile(
        &self,
        current: Key,
        history: &[Key],
        last_position: Option<Key>,
        loaded: Option<P::Value>,
    ) {
        let raw = self.inner.predictor.likelihoods(current, history);
        let scores = scheduler::sanitize_scores(raw);
        let incremental = scheduler::is_incremental(last_position, current);

        let mut evicted = None;
        let enqueued = {
            let mut state = self.inner.state.lock();
            if self.inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            state.likelihoods = scores;
            if let Some(value) = loaded {
                evicted =
                    state.insert_bounded(current, value, &self.inner.policy, &self.inner.metrics);
            }
            let candidates = scheduler::refine_candidates(
                &state.likelihoods,
                current,
                |key| state.store.contains(key),
                state.in_flight,
            );
            if incremental {
                state.queue.sync(&candidates)
            } else {
                state.queue.rebuild(&candidates)
            }
        };

        if let Some(victim) = evicted {
            tracing::debug!(key = victim, "evicted");
            self.inner.emit(CacheEvent::Evict { key: victim });
        }
        for &key in &enqueued {
            self.inner.emit(CacheEvent::PrefetchEnqueued { key });
        }
        if !enqueued.is_empty() {
            self.inner.queue_signal.notify_one();
        }
    }
}

impl<P: DataProvider, A: AccessPredictor> Drop for PresageCache<P, A> {
    fn drop(&mut self) {
        self.close();
    }
}
