//! Integration Tests for Dynamic Configuration and the Manager
//!
//! Live capacity changes reaching running stores, frozen configurations and
//! the manager lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tiered_cache::{
    CacheError, CacheManager, Config, DynamicConfigBridge, DynamicTarget, Entry, EvictorKind, LiveConfiguration,
    Pool, SegmentedStore, SizeOfEngine, Store, StoreConfig, TwoTierStore,
};

// == Helper Functions ==

fn populated(count: u64) -> (Pool, Arc<SegmentedStore<u64, String>>) {
    let pool = Pool::new("heap", 1_000, EvictorKind::FromLargest, SizeOfEngine::Unit);
    let store = SegmentedStore::new(&StoreConfig::new("live").segments(4).max_entries(count), &pool);
    for key in 0..count {
        store.put(Entry::new(key, format!("value-{}", key))).unwrap();
    }
    (pool, store)
}

fn bridged(store: &Arc<SegmentedStore<u64, String>>, pool: Option<Pool>, dynamic: bool) -> LiveConfiguration {
    let config = LiveConfiguration::new("live", store.max_entries(), 1_000, 0, 0, dynamic);
    let target: Arc<dyn DynamicTarget> = store.clone();
    DynamicConfigBridge::attach(&config, Arc::downgrade(&target), pool);
    config
}

// == Dynamic Shrink ==

#[test]
fn test_shrink_evicts_down_to_new_cap() {
    let (pool, store) = populated(10);
    let config = bridged(&store, None, true);

    config.set_max_entries(3).unwrap();

    assert_eq!(store.size(), 3);
    assert_eq!(pool.size(), 3);
    assert_eq!(store.stats().evictions, 7);
}

#[test]
fn test_shrink_stops_at_pinned_entries() {
    let (pool, store) = populated(10);
    for key in 0..5 {
        store.set_pinned(&key, true);
    }
    let config = bridged(&store, None, true);

    config.set_max_entries(3).unwrap();

    assert_eq!(store.size(), 5);
    assert_eq!(pool.size(), 5);
    for key in 0..5 {
        assert!(store.contains_key(&key));
    }

    // once unpinned, the next put restores the cap
    store.unpin_all();
    store.put(Entry::new(99, "late".to_string())).unwrap();
    assert!(store.size() <= 3);
}

#[test]
fn test_grow_keeps_entries() {
    let (_pool, store) = populated(5);
    let config = bridged(&store, None, true);

    config.set_max_entries(50).unwrap();
    for key in 5..50 {
        store.put(Entry::new(key, "more".to_string())).unwrap();
    }
    assert_eq!(store.size(), 50);
}

#[test]
fn test_max_bytes_resizes_bridged_pool() {
    let (pool, store) = populated(10);
    let config = bridged(&store, Some(pool.clone()), true);

    config.set_max_bytes(4).unwrap();

    assert_eq!(pool.max_size(), 4);
    assert!(store.size() <= 4);
    assert_eq!(pool.size(), store.pool_size());
}

#[test]
fn test_frozen_configuration_leaves_store_alone() {
    let (_pool, store) = populated(10);
    let config = bridged(&store, None, false);

    let result = config.set_max_entries(3);
    assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    assert_eq!(store.size(), 10);
    assert_eq!(store.max_entries(), 10);
}

#[test]
fn test_ttl_change_applies_lazily() {
    let (_pool, store) = populated(3);
    let config = bridged(&store, None, true);

    config.set_ttl(1).unwrap();
    std::thread::sleep(Duration::from_millis(1_100));

    assert!(store.get(&0).is_none());
    assert_eq!(store.evict_expired(), 2);
    assert_eq!(store.size(), 0);
}

// == Manager Lifecycle ==

#[test]
fn test_manager_builds_live_configurable_tiered_store() {
    let manager = CacheManager::new(&Config::default());
    let tiered: Arc<TwoTierStore<u64, String>> = manager
        .create_tiered(
            &StoreConfig::new("orders").max_entries(10),
            &StoreConfig::new("orders-disk"),
            None,
        )
        .unwrap();
    for key in 0..10 {
        tiered.put(Entry::new(key, format!("order-{}", key))).unwrap();
    }
    assert_eq!(tiered.cache().size(), 10);

    let live = manager.configuration("orders").unwrap();
    live.set_max_entries(3).unwrap();

    assert_eq!(tiered.cache().size(), 3);
    assert_eq!(tiered.size(), 10);
    for key in 0..10 {
        assert_eq!(tiered.get(&key).unwrap().value(), &format!("order-{}", key));
    }
}

#[test]
fn test_manager_shutdown_zeroes_pools() {
    let manager = CacheManager::new(&Config::default());
    let plain: Arc<SegmentedStore<u64, String>> = manager.create_store(&StoreConfig::new("plain")).unwrap();
    let tiered: Arc<TwoTierStore<u64, String>> = manager
        .create_tiered(&StoreConfig::new("t"), &StoreConfig::new("t-disk"), None)
        .unwrap();
    plain.put(Entry::new(1, "a".to_string())).unwrap();
    tiered.put(Entry::new(2, "b".to_string())).unwrap();
    assert_eq!(manager.managed_stores().len(), 2);
    assert!(manager.heap_pool().size() > 0);
    assert!(manager.disk_pool().size() > 0);

    manager.shutdown();

    assert_eq!(manager.heap_pool().size(), 0);
    assert_eq!(manager.disk_pool().size(), 0);
    assert!(matches!(plain.put(Entry::new(3, "c".to_string())), Err(CacheError::Disposed)));
    let late: Result<Arc<SegmentedStore<u64, String>>, CacheError> =
        manager.create_store(&StoreConfig::new("late"));
    assert!(matches!(late, Err(CacheError::Disposed)));
}

#[tokio::test]
async fn test_manager_stores_swept_by_expiry_task() {
    let manager = CacheManager::new(&Config::default());
    let store: Arc<SegmentedStore<u64, String>> =
        manager.create_store(&StoreConfig::new("short").ttl(1)).unwrap();
    store.put(Entry::new(1, "gone".to_string())).unwrap();

    let handle = tiered_cache::spawn_expiry_task(manager.managed_stores(), 1);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    handle.abort();

    assert_eq!(store.quick_size(), 0);
    assert_eq!(manager.stats()[0].expirations, 1);
}
