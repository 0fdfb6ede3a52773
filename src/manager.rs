//! Cache Manager Module
//!
//! Owns the heap and disk pools, creates stores against them, keeps a live
//! configuration per store and disposes everything on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry as NameEntry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::{Config, StoreConfig};
use crate::dynamic::{DynamicConfigBridge, DynamicTarget, LiveConfiguration};
use crate::error::{CacheError, Result};
use crate::pool::Pool;
use crate::store::{CacheKey, CacheValue, ManagedStore, SegmentedStore, StoreStats, TieredStore, ValueCopier};

/// Tiered store whose authority is a segmented store on the disk pool.
pub type TwoTierStore<K, V> = TieredStore<K, V, SegmentedStore<K, V>>;

/// Creates and tracks the stores of one process.
pub struct CacheManager {
    config: Config,
    heap_pool: Pool,
    disk_pool: Pool,
    stores: RwLock<Vec<Arc<dyn ManagedStore>>>,
    configurations: DashMap<String, Arc<LiveConfiguration>>,
    /// Every store name in use, tiers included
    names: DashMap<String, ()>,
    shut_down: AtomicBool,
}

impl CacheManager {
    // == Constructor ==
    /// Creates the heap pool and the disk pool from `config`.
    pub fn new(config: &Config) -> Self {
        let heap_pool = Pool::new(
            "heap",
            config.heap_max_bytes,
            config.pool_evictor,
            config.sizeof_engine,
        );
        let disk_pool = Pool::new(
            "disk",
            config.disk_max_bytes,
            config.pool_evictor,
            config.sizeof_engine,
        );
        info!(
            heap_max_bytes = config.heap_max_bytes,
            disk_max_bytes = config.disk_max_bytes,
            evictor = ?config.pool_evictor,
            engine = ?config.sizeof_engine,
            "cache manager created"
        );
        Self {
            config: config.clone(),
            heap_pool,
            disk_pool,
            stores: RwLock::new(Vec::new()),
            configurations: DashMap::new(),
            names: DashMap::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn heap_pool(&self) -> &Pool {
        &self.heap_pool
    }

    pub fn disk_pool(&self) -> &Pool {
        &self.disk_pool
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // == Store Creation ==
    /// Creates a store charged to the shared heap pool.
    pub fn create_store<K: CacheKey, V: CacheValue>(&self, config: &StoreConfig) -> Result<Arc<SegmentedStore<K, V>>> {
        self.create_on(config, &self.heap_pool, false)
    }

    /// Creates a store charged to the shared disk pool.
    pub fn create_disk_store<K: CacheKey, V: CacheValue>(
        &self,
        config: &StoreConfig,
    ) -> Result<Arc<SegmentedStore<K, V>>> {
        self.create_on(config, &self.disk_pool, false)
    }

    /// Creates a store with a pool of its own.
    ///
    /// Byte-budget changes on the store's live configuration resize that pool.
    pub fn create_store_with_pool<K: CacheKey, V: CacheValue>(
        &self,
        config: &StoreConfig,
        pool: Pool,
    ) -> Result<Arc<SegmentedStore<K, V>>> {
        self.create_on(config, &pool, true)
    }

    /// Creates a heap store in front of a disk-pool authority.
    ///
    /// # Arguments
    /// * `cache` - Fast tier configuration, also carrying the copy flags
    /// * `authority` - Authoritative tier configuration
    /// * `copier` - Copy strategy used when a copy flag is set
    pub fn create_tiered<K: CacheKey, V: CacheValue>(
        &self,
        cache: &StoreConfig,
        authority: &StoreConfig,
        copier: Option<Arc<dyn ValueCopier<V>>>,
    ) -> Result<Arc<TwoTierStore<K, V>>> {
        self.ensure_running()?;
        if cache.name == authority.name {
            return Err(CacheError::InvalidConfig(format!(
                "tiers of '{}' need distinct names",
                cache.name
            )));
        }
        self.reserve_names(&[cache.name.as_str(), authority.name.as_str()])?;

        let fast: Arc<SegmentedStore<K, V>> = SegmentedStore::new(cache, &self.heap_pool);
        let slow: Arc<SegmentedStore<K, V>> = SegmentedStore::new(authority, &self.disk_pool);
        let mut tiered = match TieredStore::new(cache.name.clone(), fast, slow) {
            Ok(tiered) => tiered,
            Err(err) => {
                self.release_names(&[cache.name.as_str(), authority.name.as_str()]);
                return Err(err);
            }
        };
        match copier {
            Some(copier) => tiered = tiered.with_copier(copier, cache.copy_on_read, cache.copy_on_write),
            None if cache.copy_on_read || cache.copy_on_write => {
                warn!(store = %cache.name, "copy requested without a copier; values are shared")
            }
            None => {}
        }
        let tiered = Arc::new(tiered);

        let target: Arc<dyn DynamicTarget> = tiered.clone();
        self.register(cache, target, None, tiered.clone());
        info!(store = %cache.name, authority = %authority.name, "tiered store created");
        Ok(tiered)
    }

    // == Lookup ==
    /// Live configuration of the store named `name`.
    pub fn configuration(&self, name: &str) -> Option<Arc<LiveConfiguration>> {
        self.configurations.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn managed_stores(&self) -> Vec<Arc<dyn ManagedStore>> {
        self.stores.read().clone()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.stores.read().iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs an expiry sweep over every store.
    pub fn evict_expired(&self) -> usize {
        self.managed_stores().iter().map(|s| s.evict_expired()).sum()
    }

    pub fn stats(&self) -> Vec<StoreStats> {
        self.managed_stores().iter().map(|s| s.stats()).collect()
    }

    // == Shutdown ==
    /// Disposes every store and releases both pools. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let stores = std::mem::take(&mut *self.stores.write());
        for store in &stores {
            store.dispose();
        }
        self.configurations.clear();
        self.names.clear();
        self.heap_pool.release_all();
        self.disk_pool.release_all();
        info!(stores = stores.len(), "cache manager shut down");
    }

    // == Internal Helpers ==
    fn create_on<K: CacheKey, V: CacheValue>(
        &self,
        config: &StoreConfig,
        pool: &Pool,
        owns_pool: bool,
    ) -> Result<Arc<SegmentedStore<K, V>>> {
        self.ensure_running()?;
        self.reserve_names(&[config.name.as_str()])?;

        let store: Arc<SegmentedStore<K, V>> = SegmentedStore::new(config, pool);
        let target: Arc<dyn DynamicTarget> = store.clone();
        let bridged_pool = owns_pool.then(|| pool.clone());
        self.register(config, target, bridged_pool, store.clone());
        info!(store = %config.name, pool = %pool.name(), "store created");
        Ok(store)
    }

    fn register(
        &self,
        config: &StoreConfig,
        target: Arc<dyn DynamicTarget>,
        pool: Option<Pool>,
        managed: Arc<dyn ManagedStore>,
    ) {
        let max_bytes = pool.as_ref().map_or(self.heap_pool.max_size(), |p| p.max_size());
        let live = Arc::new(LiveConfiguration::new(
            config.name.clone(),
            config.max_entries,
            max_bytes,
            config.ttl,
            config.tti,
            true,
        ));
        DynamicConfigBridge::attach(&live, Arc::downgrade(&target), pool);
        self.configurations.insert(config.name.clone(), live);
        self.stores.write().push(managed);
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    /// Claims every name in `names`, or none of them if one is taken.
    fn reserve_names(&self, names: &[&str]) -> Result<()> {
        for (claimed, name) in names.iter().enumerate() {
            let taken = match self.names.entry((*name).to_string()) {
                NameEntry::Occupied(_) => true,
                NameEntry::Vacant(slot) => {
                    slot.insert(());
                    false
                }
            };
            if taken {
                self.release_names(&names[..claimed]);
                return Err(CacheError::InvalidConfig(format!("store '{}' already exists", name)));
            }
        }
        Ok(())
    }

    fn release_names(&self, names: &[&str]) {
        for name in names {
            self.names.remove(*name);
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
