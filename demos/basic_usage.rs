use std::{error::Error, io::Write, thread, time::Duration};

use presage::prelude::*;

const NAVIGATION_STEPS: [i64; 6] = [-15, -5, -1, 1, 5, 15];

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== Presage Prefetching Cache Demo ===\n");

    // Write a small synthetic MOT dataset to a temporary file.
    let mut file = tempfile::NamedTempFile::new()?;
    for frame in 0..500i64 {
        for track in 0..3 {
            writeln!(
                file,
                "{frame},{track},{},{},40,60,0.9,{},{}",
                100 + frame,
                200 + track * 80,
                120 + frame,
                230 + track * 80,
            )?;
        }
    }
    file.flush()?;

    demo_demand_paging(file.path())?;
    demo_prefetching(file.path())?;

    Ok(())
}

/// Baseline: no predictions, every first access is a miss.
fn demo_demand_paging(path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    println!("1. Demand paging (no predictor)");
    println!("-------------------------------");

    let provider = MotDataProvider::open(path, 100)?;
    let cache = CacheBuilder::new(provider, NullPredictor)
        .max_keys_cached(64)
        .max_keys_prefetched(0)
        .build()?;

    for frame in 0..50 {
        cache.get(frame)?;
    }
    let stats = cache.stats();
    println!("  hits: {}, misses: {}", stats.hits, stats.misses);
    println!("  hit ratio: {:.2}\n", stats.hit_ratio());
    cache.close();
    Ok(())
}

/// The same scan with the dynamic predictor feeding the worker.
fn demo_prefetching(path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    println!("2. Predictive prefetching");
    println!("-------------------------");

    let provider = MotDataProvider::open(path, 100)?;
    let predictor = DynamicPredictor::new(NAVIGATION_STEPS).with_length(500);
    let cache = CacheBuilder::new(provider, predictor)
        .max_keys_cached(64)
        .max_keys_prefetched(16)
        .eviction_policy(PolicyKind::Oldest)
        .on_event(|event| {
            if let CacheEvent::Evict { key } = event {
                println!("  (evicted frame {key})");
            }
        })
        .build()?;

    // Walk forward, give the worker a moment to run ahead of us.
    let mut position = 0i64;
    for _ in 0..50 {
        let frame = cache.get(position)?;
        if position % 10 == 0 {
            println!(
                "  frame {:>3}: {} detections",
                frame.frame_number,
                frame.detections.len()
            );
        }
        position += 1;
        thread::sleep(Duration::from_millis(2));
    }

    // Jump the way a user scrubbing a timeline would.
    for step in [15, 15, -5, 15, 5] {
        position = (position + step).clamp(0, 499);
        cache.get(position)?;
        thread::sleep(Duration::from_millis(2));
    }

    let stats = cache.stats();
    println!("  hits: {}, misses: {}", stats.hits, stats.misses);
    println!("  prefetch queue depth: {}", stats.active_prefetch_tasks);
    println!("  hit ratio: {:.2}", stats.hit_ratio());
    cache.close();
    Ok(())
}
