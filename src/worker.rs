//! The background prefetch worker.
//!
//! A single thread owned by the cache. It blocks on the queue signal while
//! idle, pops the highest-priority task, loads it through the provider with
//! no locks held, and inserts the result under the same bounded-eviction
//! discipline as a synchronous miss. Provider failures are counted and
//! reported but never stop the loop; only shutdown does.

use std::{
    sync::{atomic::Ordering, Arc},
    time::Instant,
};

use crate::{cache::Inner, AccessPredictor, CacheEvent, DataProvider};

pub(crate) fn run<P, A>(inner: Arc<Inner<P, A>>)
where
    P: DataProvider,
    A: AccessPredictor,
{
    tracing::debug!("prefetch worker started");
    loop {
        let task = {
            let mut state = inner.state.lock();
            loop {
                if inner.shutdown.load(Ordering::Acquire) {
                    tracing::debug!("prefetch worker terminated");
                    return;
                }
                match state.queue.pop() {
                    // Lost the race against a synchronous load of the same
                    // key; the task is moot.
                    Some(task) if state.store.contains(task.key) => {
                        tracing::trace!(key = task.key, "discarding prefetch for cached key");
                    }
                    Some(task) => {
                        state.in_flight = Some(task.key);
                        break task;
                    }
                    None => inner.queue_signal.wait(&mut state),
                }
            }
        };

        let started = Instant::now();
        match inner.provider.load(task.key) {
            Ok(value) => {
                let evicted = {
                    let mut state = inner.state.lock();
                    state.in_flight = None;
                    if inner.shutdown.load(Ordering::Acquire) {
                        // The store is being torn down; drop the late result.
                        continue;
                    }
                    state.insert_bounded(task.key, value, &inner.policy, &inner.metrics)
                };
                if let Some(victim) = evicted {
                    inner.emit(CacheEvent::Evict { key: victim });
                }
                inner.emit(CacheEvent::PrefetchSuccess {
                    key: task.key,
                    duration: started.elapsed(),
                });
                tracing::trace!(
                    key = task.key,
                    priority = task.priority,
                    "prefetched key"
                );
            }
            Err(error) => {
                inner.state.lock().in_flight = None;
                inner.metrics.record_prefetch_error();
                inner.emit(CacheEvent::PrefetchError { key: task.key });
                tracing::warn!(key = task.key, %error, "prefetch load failed");
            }
        }
    }
}
