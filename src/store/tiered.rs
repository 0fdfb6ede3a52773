//! Tiered Store Module
//!
//! Puts a fast [`SegmentedStore`] in front of an authoritative tier that
//! holds every entry. Entries held by the fast tier stay in flight in the
//! authority until the fast tier evicts them and flushes them back.
//!
//! The two tiers must be charged to different pools: eviction from the fast
//! tier flushes into the authority while a fast-tier segment may be locked.
//!
//! Entries enter the fast tier only through a conditional install that
//! checks, under the fast-tier segment lock, that the authority still holds
//! the same version. Every fault is balanced by exactly one flush.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::copy::ValueCopier;
use super::entry::Entry;
use super::segmented::{Install, SegmentedStore};
use super::stats::StoreStats;
use super::{AuthoritativeTier, CacheKey, CacheValue, EvictionListener, ManagedStore, Store};
use crate::error::{CacheError, Result};

/// Hands entries leaving the fast tier back to the authority.
struct FlushToAuthority<A> {
    authority: Arc<A>,
}

impl<K, V, A> EvictionListener<K, V> for FlushToAuthority<A>
where
    A: AuthoritativeTier<K, V>,
{
    fn evicted(&self, entry: &Entry<K, V>) {
        if !self.authority.flush(entry) {
            debug!("evicted entry was not in flight");
        }
    }

    fn expired(&self, entry: &Entry<K, V>) {
        self.authority.flush(entry);
    }
}

// == Tiered Store ==
/// A caching tier over an authoritative tier.
pub struct TieredStore<K, V, A> {
    name: String,
    cache: Arc<SegmentedStore<K, V>>,
    authority: Arc<A>,
    copier: Option<Arc<dyn ValueCopier<V>>>,
    copy_on_read: bool,
    copy_on_write: bool,
}

impl<K, V, A> TieredStore<K, V, A>
where
    K: CacheKey,
    V: CacheValue,
    A: AuthoritativeTier<K, V> + ManagedStore + 'static,
{
    // == Constructor ==
    /// Composes `cache` over `authority`.
    ///
    /// Registers a listener on `cache` that flushes evicted and expired
    /// entries back to `authority`. Fails with `InvalidConfig` if both tiers
    /// are charged to the same pool.
    pub fn new(name: impl Into<String>, cache: Arc<SegmentedStore<K, V>>, authority: Arc<A>) -> Result<Self> {
        let name = name.into();
        if cache.pool().same_pool(authority.pool()) {
            return Err(CacheError::InvalidConfig(format!(
                "tiers of '{}' share pool '{}'",
                name,
                authority.pool().name()
            )));
        }
        cache.add_listener(Arc::new(FlushToAuthority {
            authority: Arc::clone(&authority),
        }));
        Ok(Self {
            name,
            cache,
            authority,
            copier: None,
            copy_on_read: false,
            copy_on_write: false,
        })
    }

    /// Copies values crossing the tier boundary.
    ///
    /// # Arguments
    /// * `copier` - Copy strategy
    /// * `on_read` - Copy values handed out by `get`
    /// * `on_write` - Copy values accepted by `put`
    pub fn with_copier(mut self, copier: Arc<dyn ValueCopier<V>>, on_read: bool, on_write: bool) -> Self {
        self.copier = Some(copier);
        self.copy_on_read = on_read;
        self.copy_on_write = on_write;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fast tier.
    pub fn cache(&self) -> &Arc<SegmentedStore<K, V>> {
        &self.cache
    }

    /// The authoritative tier.
    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    pub fn dispose(&self) {
        self.cache.dispose();
        Store::dispose(&*self.authority);
    }

    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired() + ManagedStore::evict_expired(&*self.authority)
    }

    /// Combined view: authority counters plus fast-tier hits.
    pub fn stats(&self) -> StoreStats {
        let cache = self.cache.stats();
        let mut stats = ManagedStore::stats(&*self.authority);
        stats.name = self.name.clone();
        stats.hits += cache.hits;
        stats.rejections += cache.rejections;
        stats
    }

    /// True if the authority still holds the version `cached` was taken from.
    fn is_current(&self, cached: &Entry<K, V>) -> bool {
        self.authority
            .get_quiet(cached.key())
            .is_some_and(|held| held.version() == cached.version())
    }

    fn copy_value(&self, entry: Entry<K, V>, enabled: bool) -> Result<Entry<K, V>> {
        match &self.copier {
            Some(copier) if enabled => Ok(entry.with_value(copier.copy(entry.value())?)),
            _ => Ok(entry),
        }
    }

    fn copy_for_read(&self, entry: Entry<K, V>) -> Option<Entry<K, V>> {
        match self.copy_value(entry, self.copy_on_read) {
            Ok(entry) => Some(entry),
            Err(err) => {
                error!(store = %self.name, %err, "copy on read failed");
                None
            }
        }
    }
}

// == Store ==
impl<K, V, A> Store<K, V> for TieredStore<K, V, A>
where
    K: CacheKey,
    V: CacheValue,
    A: AuthoritativeTier<K, V> + ManagedStore + 'static,
{
    /// Writes through the authority first, then caches.
    ///
    /// If the fast tier rejects the entry the authority keeps it and it is
    /// flushed straight away. Returns the entry previously held.
    fn put(&self, entry: Entry<K, V>) -> Result<Option<Entry<K, V>>> {
        let entry = self.copy_value(entry, self.copy_on_write)?;
        let previous = self.authority.get_quiet(entry.key());

        if !self.authority.put_faulted(entry.clone())? {
            // one entry requested, the authority had no room for it
            return Err(CacheError::Rejected {
                requested: 1,
                available: 0,
            });
        }

        let is_current = |cached: &Entry<K, V>| self.is_current(cached);
        match self.cache.install(entry.clone(), true, &is_current) {
            Ok(Install::Installed) => {}
            Ok(_) => {
                debug!(store = %self.name, "write already cached or superseded");
                self.authority.flush(&entry);
            }
            Err(err) if err.is_recoverable() => {
                debug!(store = %self.name, %err, "entry kept in authority only");
                self.cache.remove_if_stale(entry.key(), &is_current)?;
                self.authority.flush(&entry);
            }
            Err(err) => return Err(err),
        }
        Ok(previous)
    }

    /// Reads the fast tier, faulting from the authority on a miss.
    ///
    /// When the fault cannot be cached the value is still returned. A fault
    /// that lost a race with a put or remove is flushed back, never cached.
    fn get(&self, key: &K) -> Option<Entry<K, V>> {
        if let Some(entry) = self.cache.get(key) {
            return self.copy_for_read(entry);
        }
        let faulted = self.authority.fault(key, true)?;
        let is_current = |cached: &Entry<K, V>| self.is_current(cached);
        match self.cache.install(faulted.clone(), false, &is_current) {
            Ok(Install::Installed) => self.copy_for_read(faulted),
            Ok(Install::Present(held)) => {
                self.authority.flush(&faulted);
                self.copy_for_read(held)
            }
            Ok(Install::Stale) => {
                self.authority.flush(&faulted);
                let current = self.authority.get_quiet(key)?;
                self.copy_for_read(current)
            }
            Err(err) => {
                warn!(store = %self.name, %err, "faulted entry not cached; reading through");
                self.authority.flush(&faulted);
                self.copy_for_read(faulted)
            }
        }
    }

    fn get_quiet(&self, key: &K) -> Option<Entry<K, V>> {
        let entry = self
            .cache
            .get_quiet(key)
            .or_else(|| self.authority.get_quiet(key))?;
        self.copy_for_read(entry)
    }

    fn remove(&self, key: &K) -> Result<Option<Entry<K, V>>> {
        let cached = self.cache.remove(key)?;
        let removed = self.authority.remove(key)?;
        // a concurrent fault may have cached the removed entry again
        self.cache
            .remove_if_stale(key, &|cached: &Entry<K, V>| self.is_current(cached))?;
        Ok(removed.or(cached))
    }

    fn remove_all(&self) -> Result<()> {
        self.cache.remove_all()?;
        self.authority.remove_all()?;
        self.cache.remove_all()
    }

    fn size(&self) -> u64 {
        self.authority.size()
    }

    fn quick_size(&self) -> u64 {
        self.authority.quick_size()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.cache.contains_key(key) || self.authority.contains_key(key)
    }

    fn dispose(&self) {
        TieredStore::dispose(self)
    }

    fn set_pinned(&self, key: &K, pinned: bool) {
        self.cache.set_pinned(key, pinned);
        self.authority.set_pinned(key, pinned);
    }

    fn is_pinned(&self, key: &K) -> bool {
        self.authority.is_pinned(key)
    }

    fn unpin_all(&self) {
        self.cache.unpin_all();
        self.authority.unpin_all();
    }

    fn keys(&self) -> Box<dyn Iterator<Item = K> + '_> {
        self.authority.keys()
    }
}

// == Managed Store ==
impl<K, V, A> ManagedStore for TieredStore<K, V, A>
where
    K: CacheKey,
    V: CacheValue,
    A: AuthoritativeTier<K, V> + ManagedStore + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dispose(&self) {
        TieredStore::dispose(self)
    }

    fn evict_expired(&self) -> usize {
        TieredStore::evict_expired(self)
    }

    fn stats(&self) -> StoreStats {
        TieredStore::stats(self)
    }
}
