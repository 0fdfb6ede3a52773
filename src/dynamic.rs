//! Dynamic Configuration Module
//!
//! Live capacity and expiry settings, and the bridge that applies changes
//! to a running store and its pool without stopping traffic.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::pool::Pool;
use crate::store::{CacheKey, CacheValue, SegmentedStore, TieredStore};

// == Configuration Listener ==
/// Receives (old, new) pairs for every accepted change.
pub trait ConfigurationListener: Send + Sync {
    fn on_max_entries_changed(&self, _old: u64, _new: u64) {}

    fn on_max_bytes_changed(&self, _old: u64, _new: u64) {}

    fn on_ttl_changed(&self, _old: u64, _new: u64) {}

    fn on_tti_changed(&self, _old: u64, _new: u64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveValues {
    max_entries: u64,
    max_bytes: u64,
    ttl: u64,
    tti: u64,
}

// == Live Configuration ==
/// Mutable settings of one cache.
///
/// A frozen configuration (`dynamic == false`) refuses every change.
pub struct LiveConfiguration {
    name: String,
    dynamic: bool,
    values: Mutex<LiveValues>,
    listeners: RwLock<Vec<Arc<dyn ConfigurationListener>>>,
}

impl std::fmt::Debug for LiveConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfiguration")
            .field("name", &self.name)
            .field("dynamic", &self.dynamic)
            .field("values", &*self.values.lock())
            .finish()
    }
}

impl LiveConfiguration {
    /// Creates a configuration with initial values.
    ///
    /// # Arguments
    /// * `name` - Cache name used in logs
    /// * `max_entries` - Entry cap (0 = unbounded)
    /// * `max_bytes` - Byte budget of the cache's pool
    /// * `ttl` / `tti` - Expiry defaults in seconds (0 = none)
    /// * `dynamic` - Whether changes are accepted at runtime
    pub fn new(name: impl Into<String>, max_entries: u64, max_bytes: u64, ttl: u64, tti: u64, dynamic: bool) -> Self {
        Self {
            name: name.into(),
            dynamic,
            values: Mutex::new(LiveValues {
                max_entries,
                max_bytes,
                ttl,
                tti,
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn max_entries(&self) -> u64 {
        self.values.lock().max_entries
    }

    pub fn max_bytes(&self) -> u64 {
        self.values.lock().max_bytes
    }

    pub fn ttl(&self) -> u64 {
        self.values.lock().ttl
    }

    pub fn tti(&self) -> u64 {
        self.values.lock().tti
    }

    pub fn add_listener(&self, listener: Arc<dyn ConfigurationListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    // == Setters ==
    pub fn set_max_entries(&self, max_entries: u64) -> Result<()> {
        let old = self.update(|values| std::mem::replace(&mut values.max_entries, max_entries))?;
        self.notify(|listener| listener.on_max_entries_changed(old, max_entries));
        Ok(())
    }

    /// Changes the byte budget; zero is refused.
    pub fn set_max_bytes(&self, max_bytes: u64) -> Result<()> {
        if max_bytes == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "cache '{}': max bytes must be greater than zero",
                self.name
            )));
        }
        let old = self.update(|values| std::mem::replace(&mut values.max_bytes, max_bytes))?;
        self.notify(|listener| listener.on_max_bytes_changed(old, max_bytes));
        Ok(())
    }

    pub fn set_ttl(&self, seconds: u64) -> Result<()> {
        let old = self.update(|values| std::mem::replace(&mut values.ttl, seconds))?;
        self.notify(|listener| listener.on_ttl_changed(old, seconds));
        Ok(())
    }

    pub fn set_tti(&self, seconds: u64) -> Result<()> {
        let old = self.update(|values| std::mem::replace(&mut values.tti, seconds))?;
        self.notify(|listener| listener.on_tti_changed(old, seconds));
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut LiveValues) -> u64) -> Result<u64> {
        if !self.dynamic {
            warn!(cache = %self.name, "change refused: configuration is frozen");
            return Err(CacheError::InvalidConfig(format!(
                "cache '{}' configuration is frozen",
                self.name
            )));
        }
        let mut values = self.values.lock();
        Ok(change(&mut values))
    }

    /// Calls every listener outside the values lock.
    fn notify(&self, call: impl Fn(&dyn ConfigurationListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            call(listener.as_ref());
        }
    }
}

// == Dynamic Target ==
/// A store whose capacity and expiry can change while it runs.
pub trait DynamicTarget: Send + Sync {
    /// Applies a new entry cap, shrinking synchronously. Returns true if the
    /// store fits afterwards.
    fn apply_max_entries(&self, max_entries: u64) -> bool;

    fn apply_ttl(&self, seconds: u64);

    fn apply_tti(&self, seconds: u64);

    fn target_name(&self) -> &str;
}

impl<K: CacheKey, V: CacheValue> DynamicTarget for SegmentedStore<K, V> {
    fn apply_max_entries(&self, max_entries: u64) -> bool {
        self.set_max_entries(max_entries)
    }

    fn apply_ttl(&self, seconds: u64) {
        self.set_ttl(seconds);
    }

    fn apply_tti(&self, seconds: u64) {
        self.set_tti(seconds);
    }

    fn target_name(&self) -> &str {
        self.name()
    }
}

/// Capacity changes apply to the fast tier; expiry to both tiers.
impl<K, V> DynamicTarget for TieredStore<K, V, SegmentedStore<K, V>>
where
    K: CacheKey,
    V: CacheValue,
{
    fn apply_max_entries(&self, max_entries: u64) -> bool {
        self.cache().set_max_entries(max_entries)
    }

    fn apply_ttl(&self, seconds: u64) {
        self.cache().set_ttl(seconds);
        self.authority().set_ttl(seconds);
    }

    fn apply_tti(&self, seconds: u64) {
        self.cache().set_tti(seconds);
        self.authority().set_tti(seconds);
    }

    fn target_name(&self) -> &str {
        self.name()
    }
}

// == Dynamic Config Bridge ==
/// Applies configuration changes to a running store and its pool.
///
/// Holds the store weakly so a disposed store is simply skipped.
pub struct DynamicConfigBridge {
    target: Weak<dyn DynamicTarget>,
    pool: Option<Pool>,
}

impl DynamicConfigBridge {
    /// # Arguments
    /// * `target` - Store receiving entry-cap and expiry changes
    /// * `pool` - Pool receiving byte-budget changes, if the cache owns one
    pub fn new(target: Weak<dyn DynamicTarget>, pool: Option<Pool>) -> Self {
        Self { target, pool }
    }

    /// Registers a bridge for `target` on `config`.
    pub fn attach(config: &LiveConfiguration, target: Weak<dyn DynamicTarget>, pool: Option<Pool>) {
        config.add_listener(Arc::new(Self::new(target, pool)));
        debug!(cache = %config.name(), "dynamic configuration bridge attached");
    }

    fn with_target(&self, apply: impl FnOnce(&dyn DynamicTarget)) {
        match self.target.upgrade() {
            Some(target) => apply(target.as_ref()),
            None => debug!("configuration change for a dropped store ignored"),
        }
    }
}

impl ConfigurationListener for DynamicConfigBridge {
    fn on_max_entries_changed(&self, old: u64, new: u64) {
        self.with_target(|target| {
            info!(store = %target.target_name(), old, new, "applying max entries");
            target.apply_max_entries(new);
        });
    }

    fn on_max_bytes_changed(&self, old: u64, new: u64) {
        if let Some(pool) = &self.pool {
            info!(pool = %pool.name(), old, new, "applying max bytes");
            pool.set_max_size(new);
        }
    }

    fn on_ttl_changed(&self, _old: u64, new: u64) {
        self.with_target(|target| target.apply_ttl(new));
    }

    fn on_tti_changed(&self, _old: u64, new: u64) {
        self.with_target(|target| target.apply_tti(new));
    }
}
