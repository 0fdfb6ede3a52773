//! Integration Tests for Tiered Stores
//!
//! Fault and flush between a fast tier and its authority, degraded
//! read-through and copy at the tier boundary.

use std::sync::Arc;
use std::thread;

use tiered_cache::{
    AuthoritativeTier, CacheError, CloneCopier, Entry, EvictorKind, JsonCopier, Pool, SegmentedStore, SizeOfEngine,
    Store, StoreConfig, TieredStore, TwoTierStore,
};

// == Helper Functions ==

struct Tiers {
    heap: Pool,
    disk: Pool,
    store: TwoTierStore<u64, String>,
}

fn tiers(heap_max: u64, cache_max: u64) -> Tiers {
    tiers_over(heap_max, cache_max, Pool::unbounded("disk", SizeOfEngine::Unit))
}

fn tiers_over(heap_max: u64, cache_max: u64, disk: Pool) -> Tiers {
    let heap = Pool::new("heap", heap_max, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let cache = SegmentedStore::new(&StoreConfig::new("cache").segments(1).max_entries(cache_max), &heap);
    let authority = SegmentedStore::new(&StoreConfig::new("authority").segments(1), &disk);
    Tiers {
        heap,
        disk,
        store: TieredStore::new("tiered", cache, authority).unwrap(),
    }
}

fn entry(key: u64, value: &str) -> Entry<u64, String> {
    Entry::new(key, value.to_string())
}

// == Fault / Flush ==

#[test]
fn test_faulted_entry_is_pinned_in_authority_until_flushed() {
    let Tiers { store, .. } = tiers(100, 1);
    let authority = Arc::clone(store.authority());
    authority.put(entry(1, "one")).unwrap();

    // a miss in the fast tier faults the entry out of the authority
    let read = store.get(&1).unwrap();
    assert_eq!(read.value(), "one");
    assert!(store.cache().contains_key(&1));

    // in flight: the authority refuses to evict it
    assert_eq!(authority.evict(10).unwrap(), 0);
    assert!(!authority.evict_key(&1).unwrap());
    assert!(authority.contains_key(&1));

    // a second key pushes 1 out of the fast tier and flushes it back
    store.put(entry(2, "two")).unwrap();
    assert!(!store.cache().contains_key(&1));
    assert!(store.cache().contains_key(&2));

    assert!(authority.evict_key(&1).unwrap());
    assert!(!authority.contains_key(&1));
    assert!(!authority.evict_key(&2).unwrap());
}

#[test]
fn test_flush_carries_access_metadata_back() {
    let Tiers { store, .. } = tiers(100, 1);
    let authority = Arc::clone(store.authority());
    authority.put(entry(1, "one")).unwrap();

    store.get(&1);
    store.get(&1);
    store.get(&1);
    let hits_in_cache = store.cache().get_quiet(&1).unwrap().hit_count();

    store.put(entry(2, "two")).unwrap();
    let flushed = authority.get_quiet(&1).unwrap();
    assert!(flushed.hit_count() >= hits_in_cache);
}

#[test]
fn test_direct_fault_and_flush_round_trip() {
    let disk = Pool::unbounded("disk", SizeOfEngine::Unit);
    let authority: Arc<SegmentedStore<u64, String>> =
        SegmentedStore::new(&StoreConfig::new("authority").segments(2), &disk);
    authority.put(entry(1, "one")).unwrap();

    let faulted = authority.fault(&1, true).unwrap();
    assert!(!authority.evict_key(&1).unwrap());

    assert!(authority.flush(&faulted));
    assert!(!authority.flush(&faulted));
    assert!(authority.evict_key(&1).unwrap());
    assert_eq!(disk.size(), 0);
}

#[test]
fn test_flush_of_replaced_entry_is_ignored() {
    let disk = Pool::unbounded("disk", SizeOfEngine::Unit);
    let authority: Arc<SegmentedStore<u64, String>> =
        SegmentedStore::new(&StoreConfig::new("authority").segments(2), &disk);
    authority.put(entry(1, "old")).unwrap();
    let stale = authority.fault(&1, false).unwrap();

    authority.put_faulted(entry(1, "new")).unwrap();
    assert!(!authority.flush(&stale));
    assert_eq!(authority.get_quiet(&1).unwrap().value(), "new");
}

// == Degraded Read-Through ==

#[test]
fn test_full_cache_tier_degrades_to_read_through() {
    let Tiers { heap, store, .. } = tiers(0, 0);

    store.put(entry(1, "one")).unwrap();
    assert_eq!(heap.size(), 0);
    assert!(!store.cache().contains_key(&1));

    assert_eq!(store.get(&1).unwrap().value(), "one");
    assert_eq!(store.get(&1).unwrap().value(), "one");

    // never left in flight, so the authority may evict it
    assert!(store.authority().evict_key(&1).unwrap());
    assert!(store.get(&1).is_none());
}

// == Capacity & Accounting ==

#[test]
fn test_authority_holds_every_entry() {
    let Tiers { heap, disk, store } = tiers(3, 0);
    for key in 0..20 {
        store.put(entry(key, "v")).unwrap();
    }

    assert_eq!(store.size(), 20);
    assert_eq!(disk.size(), 20);
    assert_eq!(heap.size(), 3);
    assert_eq!(store.cache().size(), 3);
    for key in 0..20 {
        assert_eq!(store.get(&key).unwrap().value(), "v");
    }
    assert_eq!(store.cache().size(), 3);
}

#[test]
fn test_bounded_authority_stays_within_its_pool() {
    let disk = Pool::new("disk", 5, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let Tiers { heap, disk, store } = tiers_over(2, 0, disk);

    for key in 0..20 {
        match store.put(entry(key, "v")) {
            Ok(_) | Err(CacheError::Rejected { .. }) => {}
            Err(err) => panic!("unexpected put failure: {}", err),
        }
        assert!(disk.size() <= disk.max_size());
        assert!(heap.size() <= heap.max_size());
    }
    assert!(store.size() <= 5);
    assert_eq!(store.get(&19).unwrap().value(), "v");
}

#[test]
fn test_tiers_sharing_a_pool_are_refused() {
    let pool = Pool::new("shared", 10, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let cache: Arc<SegmentedStore<u64, String>> = SegmentedStore::new(&StoreConfig::new("cache"), &pool);
    let authority: Arc<SegmentedStore<u64, String>> = SegmentedStore::new(&StoreConfig::new("authority"), &pool);

    let result = TieredStore::new("tiered", cache, authority);
    assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
}

#[test]
fn test_remove_and_dispose_release_both_pools() {
    let Tiers { heap, disk, store } = tiers(10, 0);
    for key in 0..5 {
        store.put(entry(key, "v")).unwrap();
    }
    store.remove(&0).unwrap();
    assert_eq!(disk.size(), 4);
    assert_eq!(heap.size(), 4);

    store.dispose();
    assert_eq!(disk.size(), 0);
    assert_eq!(heap.size(), 0);
}

// == Copy At The Boundary ==

#[test]
fn test_copy_on_read_hands_out_independent_values() {
    let Tiers { store, .. } = tiers(10, 0);
    let store = store.with_copier(Arc::new(JsonCopier), true, true);
    store.put(entry(1, "one")).unwrap();

    let first = store.get(&1).unwrap();
    let second = store.get(&1).unwrap();
    assert_eq!(first.value(), second.value());
    assert!(!Arc::ptr_eq(&first.value_arc(), &second.value_arc()));
}

#[test]
fn test_clone_copier_on_write_only() {
    let Tiers { store, .. } = tiers(10, 0);
    let store = store.with_copier(Arc::new(CloneCopier), false, true);
    store.put(entry(1, "one")).unwrap();

    let first = store.get(&1).unwrap();
    let second = store.get(&1).unwrap();
    assert!(Arc::ptr_eq(&first.value_arc(), &second.value_arc()));
}

// == Concurrency ==

#[test]
fn test_concurrent_reads_never_cache_a_superseded_write() {
    let Tiers { store, .. } = tiers(100, 0);
    store.put(entry(1, "0")).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for n in 1..2_000u64 {
                store.put(entry(1, &n.to_string())).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..2_000 {
                store.cache().evict_key(&1).unwrap();
                store.get(&1);
            }
        });
    });

    let held = store.authority().get_quiet(&1).unwrap();
    assert_eq!(held.value(), "1999");
    if let Some(cached) = store.cache().get_quiet(&1) {
        assert_eq!(cached.version(), held.version());
    }
    assert_eq!(store.get(&1).unwrap().value(), "1999");

    // every fault was flushed back, so once out of the cache it is evictable
    store.cache().evict_key(&1).unwrap();
    assert!(store.authority().evict_key(&1).unwrap());
}

#[test]
fn test_concurrent_remove_leaves_nothing_cached() {
    let Tiers { heap, disk, store } = tiers(100, 0);

    thread::scope(|scope| {
        scope.spawn(|| {
            for n in 0..1_000u64 {
                store.put(entry(1, &n.to_string())).unwrap();
                store.remove(&1).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..1_000 {
                store.get(&1);
            }
        });
    });

    assert!(store.get(&1).is_none());
    assert!(!store.cache().contains_key(&1));
    assert_eq!(heap.size(), 0);
    assert_eq!(disk.size(), 0);
}
