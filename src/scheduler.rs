//! Prefetch scheduling: the bounded priority queue and its reconciliation
//! with freshly computed likelihoods.
//!
//! On every access the cache recomputes predictor scores and brings the
//! queue in line with them. Near-by accesses take the incremental path,
//! which preserves queued work and only adjusts priorities at the margin; a
//! position jump drops the queue and rebuilds it from scratch. Either way
//! the worker's next pop is the globally highest-priority task.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use itertools::Itertools;

use crate::Key;

/// Accesses within this distance of the previous position reconcile the
/// queue incrementally; anything farther is treated as a jump and triggers
/// a full rebuild.
pub(crate) const MAX_INCREMENTAL_STEP: u64 = 5;

/// A unit of speculative work: load `key`, whose predicted likelihood is
/// `priority`. Tasks are disposable; a reconciliation may drop them.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchTask {
    pub priority: f64,
    pub key: Key,
}

impl PartialEq for PrefetchTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrefetchTask {}

impl PartialOrd for PrefetchTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrefetchTask {
    /// Max-heap order: higher priority first, ties by ascending key.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Bounded max-priority queue of prefetch tasks.
///
/// The queue never holds two tasks for the same key and never exceeds
/// `max_tasks`; both properties are maintained by the reconciliation
/// entry points rather than checked on push.
#[derive(Debug)]
pub(crate) struct PrefetchQueue {
    heap: BinaryHeap<PrefetchTask>,
    max_tasks: usize,
}

impl PrefetchQueue {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(max_tasks),
            max_tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pop the highest-priority task.
    pub fn pop(&mut self) -> Option<PrefetchTask> {
        self.heap.pop()
    }

    /// Drop all queued work.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Keys currently queued, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.heap.iter().map(|task| task.key)
    }

    /// Full rebuild: replace the queue with the top-scoring candidates.
    /// Returns the keys that were not queued before, highest score first.
    pub fn rebuild(&mut self, candidates: &HashMap<Key, f64>) -> Vec<Key> {
        let previous: HashSet<Key> = self.keys().collect();
        let selected: Vec<PrefetchTask> = candidates
            .iter()
            .sorted_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)))
            .take(self.max_tasks)
            .map(|(&key, &priority)| PrefetchTask { priority, key })
            .collect();
        let added = selected
            .iter()
            .map(|task| task.key)
            .filter(|key| !previous.contains(key))
            .collect();
        self.heap = selected.into_iter().collect();
        added
    }

    /// Incremental sync: keep queued tasks whose key is still a candidate
    /// (updating their priority), drop the rest, and fill the remaining
    /// room with the best new candidates. Returns the newly queued keys,
    /// highest score first.
    pub fn sync(&mut self, candidates: &HashMap<Key, f64>) -> Vec<Key> {
        let mut tasks: Vec<PrefetchTask> = Vec::with_capacity(self.heap.len());
        for task in self.heap.drain() {
            if let Some(&priority) = candidates.get(&task.key) {
                tasks.push(PrefetchTask {
                    priority,
                    key: task.key,
                });
            }
        }

        let kept: HashSet<Key> = tasks.iter().map(|task| task.key).collect();
        let mut added = Vec::new();
        let fresh = candidates
            .iter()
            .filter(|(key, _)| !kept.contains(*key))
            .sorted_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (&key, &priority) in fresh {
            if tasks.len() >= self.max_tasks {
                break;
            }
            tasks.push(PrefetchTask { priority, key });
            added.push(key);
        }

        self.heap = tasks.into_iter().collect();
        added
    }
}

/// Whether the move from `prev` to `current` stays on the incremental path.
pub(crate) fn is_incremental(prev: Option<Key>, current: Key) -> bool {
    prev.is_some_and(|p| p.abs_diff(current) <= MAX_INCREMENTAL_STEP)
}

/// Reduce raw predictor output to prefetch candidates: drop unusable
/// scores, the current key, anything already cached, and the key the
/// worker is loading right now.
pub(crate) fn refine_candidates(
    raw: &HashMap<Key, f64>,
    current: Key,
    is_cached: impl Fn(Key) -> bool,
    in_flight: Option<Key>,
) -> HashMap<Key, f64> {
    raw.iter()
        .filter(|&(&key, &score)| {
            score.is_finite()
                && score > 0.0
                && key != current
                && Some(key) != in_flight
                && !is_cached(key)
        })
        .map(|(&key, &score)| (key, score))
        .collect()
}

/// Drop non-finite and non-positive scores from raw predictor output.
pub(crate) fn sanitize_scores(raw: HashMap<Key, f64>) -> HashMap<Key, f64> {
    raw.into_iter()
        .filter(|&(_, score)| score.is_finite() && score > 0.0)
        .collect()
}
