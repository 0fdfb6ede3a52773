//! Integration Tests for Shared Pools
//!
//! Several stores charged to one pool: cross-store eviction, accounting
//! conservation under concurrency and release on dispose.

use std::sync::Arc;
use std::thread;

use tiered_cache::{Entry, EvictionPolicy, EvictorKind, Pool, SegmentedStore, SizeOfEngine, Store, StoreConfig};

// == Helper Functions ==

fn store(pool: &Pool, name: &str) -> Arc<SegmentedStore<u64, String>> {
    SegmentedStore::new(&StoreConfig::new(name).segments(4), pool)
}

fn fill(store: &SegmentedStore<u64, String>, keys: std::ops::Range<u64>) {
    for key in keys {
        store.put(Entry::new(key, format!("value-{}", key))).unwrap();
    }
}

// == Cross-Store Eviction ==

#[test]
fn test_pressure_from_one_store_evicts_from_another() {
    let pool = Pool::new("shared", 10, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let big = store(&pool, "big");
    let small = store(&pool, "small");

    fill(&big, 0..10);
    assert_eq!(pool.size(), 10);

    fill(&small, 100..104);
    assert_eq!(pool.size(), 10);
    assert_eq!(small.size(), 4);
    assert_eq!(big.size(), 6);
    assert_eq!(pool.size(), big.pool_size() + small.pool_size());
}

#[test]
fn test_round_robin_spreads_eviction() {
    let pool = Pool::new("shared", 9, EvictorKind::RoundRobin, SizeOfEngine::Unit);
    let stores: Vec<_> = (0..3).map(|i| store(&pool, &format!("s{}", i))).collect();
    for (i, s) in stores.iter().enumerate() {
        let base = i as u64 * 100;
        fill(s, base..base + 3);
    }
    assert_eq!(pool.size(), 9);

    let extra = store(&pool, "extra");
    fill(&extra, 1_000..1_003);

    assert_eq!(pool.size(), 9);
    let total: u64 = stores.iter().map(|s| s.pool_size()).sum::<u64>() + extra.pool_size();
    assert_eq!(total, pool.size());
    assert!(extra.size() >= 1);
}

#[test]
fn test_byte_budget_with_deep_sizing() {
    let pool = Pool::new("bytes", 4_096, EvictorKind::FromLargest, SizeOfEngine::default());
    let a = store(&pool, "a");
    let b = store(&pool, "b");

    for key in 0..200u64 {
        let target = if key % 2 == 0 { &a } else { &b };
        let _ = target.put(Entry::new(key, "x".repeat((key % 50) as usize)));
        assert!(pool.size() <= pool.max_size());
    }
    assert_eq!(pool.size(), a.pool_size() + b.pool_size());
}

// == Concurrency ==

#[test]
fn test_concurrent_writers_keep_accounting_consistent() {
    let pool = Pool::new("shared", 500, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let stores: Vec<_> = (0..4)
        .map(|i| {
            SegmentedStore::<u64, String>::new(
                &StoreConfig::new(format!("w{}", i)).segments(8).policy(EvictionPolicy::Lru),
                &pool,
            )
        })
        .collect();

    thread::scope(|scope| {
        for (i, s) in stores.iter().enumerate() {
            scope.spawn(move || {
                for n in 0..2_000u64 {
                    let key = (n * 7 + i as u64) % 700;
                    match n % 5 {
                        0 => {
                            s.remove(&key).unwrap();
                        }
                        1 => {
                            s.get(&key);
                        }
                        _ => {
                            let _ = s.put(Entry::new(key, format!("{}", n)));
                        }
                    }
                }
            });
        }
    });

    let total: u64 = stores.iter().map(|s| s.pool_size()).sum();
    assert_eq!(pool.size(), total);
    assert!(pool.size() <= 500);
    for s in &stores {
        assert_eq!(s.pool_size(), s.size());
    }
}

// == Release ==

#[test]
fn test_dispose_returns_units_to_pool() {
    let pool = Pool::new("shared", 100, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let a = store(&pool, "a");
    let b = store(&pool, "b");
    fill(&a, 0..20);
    fill(&b, 0..30);
    assert_eq!(pool.size(), 50);

    a.dispose();
    assert_eq!(pool.size(), 30);
    assert_eq!(pool.accessor_count(), 1);

    b.remove_all().unwrap();
    assert_eq!(pool.size(), 0);
}
