use std::collections::{HashMap, HashSet};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use presage::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Synthetic provider serving formatted strings for keys `0..size`.
struct RangeProvider {
    size: i64,
}

impl DataProvider for RangeProvider {
    type Value = String;

    fn load(&self, key: Key) -> Result<String, BoxError> {
        if (0..self.size).contains(&key) {
            Ok(format!("payload_{key}"))
        } else {
            Err(format!("key {key} out of range").into())
        }
    }

    fn available_keys(&self) -> HashSet<Key> {
        (0..self.size).collect()
    }

    fn total_keys(&self) -> usize {
        self.size as usize
    }
}

/// Repeated access to a resident key: the hit fast path.
fn bench_hit_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_path");

    let cache = CacheBuilder::new(RangeProvider { size: 1000 }, NullPredictor)
        .max_keys_cached(100)
        .build()
        .unwrap();
    cache.get(7).unwrap();

    group.bench_function("get_hit", |b| {
        b.iter(|| cache.get(7).unwrap().len())
    });

    group.finish();
    cache.close();
}

/// Sequential scans with and without a predictor feeding the worker.
fn bench_sequential_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_scan");
    group.sample_size(20);

    let scan_len = 500i64;

    group.bench_function("demand_paging", |b| {
        b.iter(|| {
            let cache = CacheBuilder::new(RangeProvider { size: 1000 }, NullPredictor)
                .max_keys_cached(200)
                .max_keys_prefetched(0)
                .build()
                .unwrap();
            for key in 0..scan_len {
                cache.get(key).unwrap();
            }
            let stats = cache.stats();
            cache.close();
            stats.misses
        })
    });

    group.bench_function("distance_decay_prefetch", |b| {
        b.iter(|| {
            let predictor = DistanceDecayPredictor::with_config(8, 1.0, 0.0);
            let cache = CacheBuilder::new(RangeProvider { size: 1000 }, predictor)
                .max_keys_cached(200)
                .max_keys_prefetched(8)
                .build()
                .unwrap();
            for key in 0..scan_len {
                cache.get(key).unwrap();
            }
            let stats = cache.stats();
            cache.close();
            stats.misses
        })
    });

    group.finish();
}

/// Seek-style navigation mixing steps and jumps, the workload the dynamic
/// predictor is tuned for.
fn bench_navigation(c: &mut Criterion) {
    let mut group = c.benchmark_group("navigation");
    group.sample_size(20);

    let steps: Vec<i64> = vec![-15, -5, -1, 1, 5, 15];

    for &accesses in &[200usize, 1000] {
        group.bench_with_input(
            BenchmarkId::new("dynamic_predictor", accesses),
            &accesses,
            |b, &accesses| {
                b.iter(|| {
                    let predictor =
                        DynamicPredictor::new(steps.clone()).with_length(10_000);
                    let cache = CacheBuilder::new(RangeProvider { size: 10_000 }, predictor)
                        .max_keys_cached(256)
                        .max_keys_prefetched(16)
                        .build()
                        .unwrap();

                    let mut rng = StdRng::seed_from_u64(42);
                    let mut position = 5_000i64;
                    for _ in 0..accesses {
                        let step = steps[rng.gen_range(0..steps.len())];
                        position = (position + step).clamp(0, 9_999);
                        cache.get(position).unwrap();
                    }
                    let stats = cache.stats();
                    cache.close();
                    stats.hits
                })
            },
        );
    }

    group.finish();
}

/// Raw predictor scoring cost, isolated from the cache.
fn bench_predictors(c: &mut Criterion) {
    let mut group = c.benchmark_group("predictors");

    let history: Vec<Key> = (90..100).collect();
    let maps: HashMap<&str, Box<dyn AccessPredictor>> = HashMap::from([
        (
            "distance_decay",
            Box::new(DistanceDecayPredictor::new()) as Box<dyn AccessPredictor>,
        ),
        (
            "dynamic",
            Box::new(DynamicPredictor::new([-15, -5, -1, 1, 5, 15])) as Box<dyn AccessPredictor>,
        ),
    ]);

    for (name, predictor) in maps {
        group.bench_function(name, |b| {
            b.iter(|| predictor.likelihoods(100, &history).len())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hit_path,
    bench_sequential_scan,
    bench_navigation,
    bench_predictors
);

criterion_main!(benches);
