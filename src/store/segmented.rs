//! Segmented Store Module
//!
//! A concurrent map from key to [`Entry`], sharded into a fixed,
//! power-of-two number of independently locked segments. Every mutation is
//! charged to the store's [`PoolAccessor`] under the key's segment lock, so
//! the pool total always matches what the store holds.
//!
//! Lock order: a thread holding a segment lock only ever *tries* other
//! segment locks (pool-driven eviction), and eviction listeners run after
//! the segment lock is released.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::entry::{current_timestamp_ms, Entry, ExpiryDefaults};
use super::policy::EvictionPolicy;
use super::segment::{Segment, SegmentWriteGuard, Slot, Table, VictimFilter};
use super::stats::{StatsRecorder, StoreStats};
use super::{
    AuthoritativeTier, CacheKey, CacheValue, EvictionListener, ManagedStore, Store, MAX_EVICTION_RUNS,
};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::pool::{Pool, PoolAccessor, PoolParticipant, DEFAULT_EVICTION_ATTEMPTS};

/// An entry that left the store without an explicit remove.
enum Removal<K, V> {
    Evicted(Entry<K, V>),
    Expired(Entry<K, V>),
}

/// Outcome of [`SegmentedStore::install`].
#[derive(Debug)]
pub enum Install<K, V> {
    /// The entry is now held.
    Installed,
    /// The key was already held; a snapshot of that entry.
    Present(Entry<K, V>),
    /// The authority no longer holds this version.
    Stale,
}

/// Checked under the key's segment lock before a conditional insert.
struct Condition<'a, K, V> {
    replace: bool,
    is_current: &'a dyn Fn(&Entry<K, V>) -> bool,
}

impl<K: CacheKey, V> Condition<'_, K, V> {
    fn refuses(&self, table: &Table<K, V>, entry: &Entry<K, V>) -> Option<Install<K, V>> {
        if let Some(slot) = table.slot(entry.key()) {
            if !self.replace || slot.entry.version() == entry.version() {
                return Some(Install::Present(table.snapshot_slot(slot)));
            }
        }
        if !(self.is_current)(entry) {
            return Some(Install::Stale);
        }
        None
    }
}

enum Insertion<K, V> {
    Inserted(Option<Entry<K, V>>),
    Refused(Install<K, V>),
}

// == Segmented Store ==
/// Pool-accounted, segment-locked store for one tier.
pub struct SegmentedStore<K, V> {
    name: String,
    segments: Box<[Segment<K, V>]>,
    mask: usize,
    hasher: RandomState,
    accessor: PoolAccessor<K>,
    policy: EvictionPolicy,
    /// Local entry cap, 0 = unbounded
    max_entries: AtomicU64,
    expiry: ExpiryDefaults,
    /// Whole store pinned in its tier
    store_pinned: bool,
    /// Bookkeeping bytes charged per entry on top of key and value
    overhead: u64,
    stats: StatsRecorder,
    listeners: RwLock<Vec<Arc<dyn EvictionListener<K, V>>>>,
    sweep_cursor: AtomicUsize,
    disposed: AtomicBool,
}

impl<K, V> std::fmt::Debug for SegmentedStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedStore")
            .field("name", &self.name)
            .field("segments", &self.segments.len())
            .field("policy", &self.policy)
            .field("max_entries", &self.max_entries.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K: CacheKey, V: CacheValue> SegmentedStore<K, V> {
    // == Constructor ==
    /// Creates a store and registers it against `pool`.
    ///
    /// # Arguments
    /// * `config` - Store description (segments, cap, policy, expiry, pinning)
    /// * `pool` - Budget the store is charged against
    pub fn new(config: &StoreConfig, pool: &Pool) -> Arc<Self> {
        let count = config.segment_count();
        let engine = config.engine.unwrap_or_else(|| pool.engine());
        let segments: Vec<Segment<K, V>> = (0..count).map(|_| Segment::new()).collect();

        let store = Arc::new_cyclic(|weak: &Weak<Self>| {
            let participant: Weak<dyn PoolParticipant> = weak.clone();
            Self {
                name: config.name.clone(),
                segments: segments.into_boxed_slice(),
                mask: count - 1,
                hasher: RandomState::new(),
                accessor: pool.create_accessor_with_engine(participant, engine),
                policy: config.policy,
                max_entries: AtomicU64::new(config.max_entries),
                expiry: ExpiryDefaults::new(config.expiry()),
                store_pinned: config.pinned,
                overhead: (mem::size_of::<Slot<K, V>>() + mem::size_of::<(K, usize)>()) as u64,
                stats: StatsRecorder::default(),
                listeners: RwLock::new(Vec::new()),
                sweep_cursor: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
            }
        });

        info!(
            store = %store.name,
            pool = %pool.name(),
            segments = count,
            max_entries = config.max_entries,
            policy = ?config.policy,
            pinned = config.pinned,
            "store created"
        );
        store
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &Pool {
        self.accessor.pool()
    }

    /// Units this store is charged in its pool.
    pub fn pool_size(&self) -> u64 {
        self.accessor.size()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Registers a listener for evictions and expirations.
    pub fn add_listener(&self, listener: Arc<dyn EvictionListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Keys currently pinned, present or not.
    pub fn pinned_count(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.read().pinned_keys() as u64)
            .sum()
    }

    // == Dynamic Settings ==
    /// Changes the local entry cap, shrinking synchronously if now over it.
    ///
    /// Returns true if the store fits afterwards. Eviction is bounded; an
    /// excess left by evictable entries is logged, one held only by pinned
    /// or in-flight entries is not.
    pub fn set_max_entries(&self, max_entries: u64) -> bool {
        let old = self.max_entries.swap(max_entries, Ordering::AcqRel);
        info!(store = %self.name, old, new = max_entries, "max entries changed");

        for _ in 0..DEFAULT_EVICTION_ATTEMPTS {
            let over = self.over_capacity();
            if over == 0 {
                return true;
            }
            match self.sweep(over as usize, true, None) {
                Ok(removals) if !removals.is_empty() => self.notify(removals),
                Ok(_) => break,
                Err(err) => {
                    error!(store = %self.name, %err, "shrink aborted");
                    break;
                }
            }
        }

        let over = self.over_capacity();
        if over == 0 {
            return true;
        }
        let held = self.quick_size().saturating_sub(self.unevictable());
        if held > max_entries {
            warn!(
                store = %self.name,
                size = self.quick_size(),
                max_entries,
                shortfall = held - max_entries,
                "store could not shrink to its new cap"
            );
        } else {
            debug!(store = %self.name, over, "store held over cap by pinned entries");
        }
        false
    }

    /// Changes the default time-to-live; existing entries are judged lazily.
    pub fn set_ttl(&self, seconds: u64) {
        let old = self.expiry.set_ttl(seconds);
        info!(store = %self.name, old, new = seconds, "ttl changed");
    }

    /// Changes the default time-to-idle; existing entries are judged lazily.
    pub fn set_tti(&self, seconds: u64) {
        let old = self.expiry.set_tti(seconds);
        info!(store = %self.name, old, new = seconds, "tti changed");
    }

    // == Targeted Eviction ==
    /// Evicts `key` unless it is pinned or in flight.
    ///
    /// Returns true if the entry was evicted.
    pub fn evict_key(&self, key: &K) -> Result<bool> {
        let entry = {
            let mut table = self.segment_for(key).write();
            let evictable = match table.slot(key) {
                None => return Ok(false),
                Some(slot) => !slot.is_faulted() && !self.store_pinned && !table.is_pinned(key),
            };
            if !evictable {
                debug!(store = %self.name, "targeted eviction refused");
                return Ok(false);
            }
            let Some(entry) = table.remove(key) else {
                return Ok(false);
            };
            self.accessor.delete(key)?;
            self.stats.record_eviction();
            entry
        };
        self.notify(vec![Removal::Evicted(entry)]);
        Ok(true)
    }

    /// Evicts up to `count` entries across all segments.
    ///
    /// Returns the number evicted.
    pub fn evict(&self, count: usize) -> Result<usize> {
        let removals = self.sweep(count, true, None)?;
        let evicted = removals.len();
        self.notify(removals);
        Ok(evicted)
    }

    /// Removes every expired entry that is not in flight.
    pub fn evict_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let expiry = self.expiry.snapshot();
        let mut removals = Vec::new();

        for segment in self.segments.iter() {
            let mut table = segment.write();
            let mut expired = table.expired(&expiry, now);
            // highest first so swap_remove never moves a pending index
            expired.sort_unstable_by(|a, b| b.cmp(a));
            for index in expired {
                let entry = table.remove_at(index);
                if let Err(err) = self.accessor.delete(entry.key()) {
                    error!(store = %self.name, %err, "failed to release expired entry");
                }
                self.stats.record_expiration();
                removals.push(Removal::Expired(entry));
            }
        }

        let count = removals.len();
        if count > 0 {
            debug!(store = %self.name, count, "expired entries removed");
        }
        self.notify(removals);
        count
    }

    /// Re-measures the entry at `key` and adjusts its accounting.
    ///
    /// For values whose retained size changed after they were stored.
    pub fn recalculate_size(&self, key: &K) -> Result<i64> {
        let table = self.segment_for(key).write();
        match table.slot(key) {
            Some(slot) => self.accessor.add(key, slot.entry.value(), self.overhead, true),
            None => Ok(0),
        }
    }

    // == Conditional Updates ==
    /// Caches an entry taken from an authoritative tier.
    ///
    /// Under the key's segment lock the entry is refused if the key is
    /// already held and `replace` is false, if the same version is already
    /// held, or if `is_current` reports that the authority has moved past
    /// this version. A refused entry is not stored; the caller owns flushing
    /// it back.
    ///
    /// # Arguments
    /// * `entry` - Entry to cache
    /// * `replace` - Whether an entry already held for the key may be replaced
    /// * `is_current` - Asks the authority whether it still holds this version
    pub fn install(
        &self,
        entry: Entry<K, V>,
        replace: bool,
        is_current: &dyn Fn(&Entry<K, V>) -> bool,
    ) -> Result<Install<K, V>> {
        let condition = Condition { replace, is_current };
        match self.insert_entry(entry, false, Some(condition))? {
            Insertion::Inserted(_) => Ok(Install::Installed),
            Insertion::Refused(refused) => Ok(refused),
        }
    }

    /// Removes the entry at `key` only if `is_current` rejects it.
    pub fn remove_if_stale(
        &self,
        key: &K,
        is_current: &dyn Fn(&Entry<K, V>) -> bool,
    ) -> Result<Option<Entry<K, V>>> {
        let mut table = self.segment_for(key).write();
        if !table.slot(key).is_some_and(|slot| !is_current(&slot.entry)) {
            return Ok(None);
        }
        let Some(entry) = table.remove(key) else {
            return Ok(None);
        };
        self.accessor.delete(key)?;
        self.stats.record_removal();
        debug!(store = %self.name, "stale entry removed");
        Ok(Some(entry))
    }

    // == Statistics ==
    pub fn stats(&self) -> StoreStats {
        self.stats
            .snapshot(&self.name, self.quick_size(), self.pinned_count(), self.accessor.size())
    }

    // == Dispose ==
    /// Drops every entry and zeroes this store's share of the pool.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for segment in self.segments.iter() {
            segment.write().drain();
        }
        self.listeners.write().clear();
        self.accessor.unlink();
        info!(store = %self.name, "store disposed");
    }

    // == Internal Helpers ==
    fn segment_for(&self, key: &K) -> &Segment<K, V> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.segments[hash & self.mask]
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    fn filter<'a>(&self, exclude: Option<&'a K>, now: u64) -> VictimFilter<'a, K> {
        VictimFilter {
            policy: self.policy,
            exclude,
            expiry: self.expiry.snapshot(),
            now,
            store_pinned: self.store_pinned,
        }
    }

    /// Entries above the local cap.
    fn over_capacity(&self) -> u64 {
        match self.max_entries() {
            0 => 0,
            max => self.quick_size().saturating_sub(max),
        }
    }

    /// Present entries that victim selection may never pick.
    fn unevictable(&self) -> u64 {
        if self.store_pinned {
            return self.quick_size();
        }
        self.segments
            .iter()
            .map(|segment| segment.read().pinned_present() as u64)
            .sum()
    }

    /// Removes one victim from a locked segment.
    fn evict_one(
        &self,
        table: &mut SegmentWriteGuard<'_, K, V>,
        filter: &VictimFilter<'_, K>,
    ) -> Result<Option<Removal<K, V>>> {
        let Some(victim) = table.select_victim(filter) else {
            return Ok(None);
        };
        let entry = table.remove_at(victim.index);
        table.sync();
        self.accessor.delete(entry.key())?;
        if victim.expired {
            self.stats.record_expiration();
            Ok(Some(Removal::Expired(entry)))
        } else {
            self.stats.record_eviction();
            Ok(Some(Removal::Evicted(entry)))
        }
    }

    /// Evicts up to `count` victims, visiting segments from a rotating start.
    ///
    /// Non-blocking sweeps skip segments another thread holds.
    fn sweep(&self, count: usize, blocking: bool, keep: Option<&K>) -> Result<Vec<Removal<K, V>>> {
        let now = current_timestamp_ms();
        let filter = self.filter(keep, now);
        let start = self.sweep_cursor.fetch_add(1, Ordering::Relaxed);
        let mut removals = Vec::new();

        for offset in 0..self.segments.len() {
            if removals.len() >= count {
                break;
            }
            let segment = &self.segments[(start + offset) & self.mask];
            let mut table = if blocking {
                segment.write()
            } else {
                match segment.try_write() {
                    Some(table) => table,
                    None => continue,
                }
            };
            while removals.len() < count {
                match self.evict_one(&mut table, &filter)? {
                    Some(removal) => removals.push(removal),
                    None => break,
                }
            }
        }

        if !removals.is_empty() {
            debug!(store = %self.name, count = removals.len(), "entries evicted");
        }
        Ok(removals)
    }

    /// Brings the store back under its cap from any segment.
    ///
    /// Runs with no segment lock held.
    fn enforce_capacity(&self, keep: &K, now: u64, removals: &mut Vec<Removal<K, V>>) -> Result<()> {
        if self.over_capacity() == 0 {
            return Ok(());
        }
        let filter = self.filter(Some(keep), now);
        let start = self.sweep_cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.segments.len() {
            if self.over_capacity() == 0 {
                break;
            }
            let mut table = self.segments[(start + offset) & self.mask].write();
            while self.over_capacity() > 0 {
                match self.evict_one(&mut table, &filter)? {
                    Some(removal) => removals.push(removal),
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Admits and inserts an entry, then restores the local cap.
    ///
    /// Pinned entries are charged without rejection. With a `condition`,
    /// the insert is refused under the segment lock when the condition fails.
    fn insert_entry(
        &self,
        entry: Entry<K, V>,
        faulted: bool,
        condition: Option<Condition<'_, K, V>>,
    ) -> Result<Insertion<K, V>> {
        self.ensure_live()?;
        let key = entry.key().clone();
        let now = current_timestamp_ms();
        let mut removals = Vec::new();
        let mut retries = 0;

        let previous = loop {
            let mut table = self.segment_for(&key).write();
            if let Some(refused) = condition.as_ref().and_then(|c| c.refuses(&table, &entry)) {
                drop(table);
                self.notify(removals);
                return Ok(Insertion::Refused(refused));
            }
            if entry.is_pinned() {
                table.set_pinned(&key, true);
            }
            let force = self.store_pinned || table.is_pinned(&key);
            match self.accessor.add(&key, entry.value(), self.overhead, force) {
                Ok(_) => {}
                Err(err @ CacheError::Rejected { .. }) if retries < MAX_EVICTION_RUNS => {
                    // pool eviction cannot reach the segment we hold; free
                    // space from this store with the lock released
                    drop(table);
                    retries += 1;
                    let freed = self.sweep(1, true, Some(&key))?;
                    if freed.is_empty() {
                        self.stats.record_rejection();
                        debug!(store = %self.name, %err, "put rejected");
                        self.notify(removals);
                        return Err(err);
                    }
                    removals.extend(freed);
                    continue;
                }
                Err(err) => {
                    if err.is_admission_failure() {
                        self.stats.record_rejection();
                        debug!(store = %self.name, %err, "put rejected");
                    }
                    self.notify(removals);
                    return Err(err);
                }
            }
            let previous = table.insert(entry, faulted);
            table.sync();
            self.stats.record_put();

            let runs = self.over_capacity().min(MAX_EVICTION_RUNS as u64);
            if runs > 0 {
                let filter = self.filter(Some(&key), now);
                for _ in 0..runs {
                    match self.evict_one(&mut table, &filter)? {
                        Some(removal) => removals.push(removal),
                        None => break,
                    }
                }
            }
            break previous;
        };

        let enforced = self.enforce_capacity(&key, now, &mut removals);
        self.notify(removals);
        enforced?;
        Ok(Insertion::Inserted(previous))
    }

    /// Removes `key` if it is still expired and not in flight.
    fn expire_key(&self, key: &K, now: u64) {
        let expiry = self.expiry.snapshot();
        let entry = {
            let mut table = self.segment_for(key).write();
            let expired = table
                .slot(key)
                .is_some_and(|slot| !slot.is_faulted() && slot.entry.is_expired_at(&expiry, now));
            if !expired {
                return;
            }
            let Some(entry) = table.remove(key) else {
                return;
            };
            if let Err(err) = self.accessor.delete(key) {
                error!(store = %self.name, %err, "failed to release expired entry");
            }
            self.stats.record_expiration();
            entry
        };
        self.notify(vec![Removal::Expired(entry)]);
    }

    fn notify(&self, removals: Vec<Removal<K, V>>) {
        if removals.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }
        for removal in &removals {
            for listener in &listeners {
                match removal {
                    Removal::Evicted(entry) => listener.evicted(entry),
                    Removal::Expired(entry) => listener.expired(entry),
                }
            }
        }
    }
}

// == Store ==
impl<K: CacheKey, V: CacheValue> Store<K, V> for SegmentedStore<K, V> {
    fn put(&self, entry: Entry<K, V>) -> Result<Option<Entry<K, V>>> {
        match self.insert_entry(entry, false, None)? {
            Insertion::Inserted(previous) => Ok(previous),
            Insertion::Refused(_) => Ok(None),
        }
    }

    fn get(&self, key: &K) -> Option<Entry<K, V>> {
        let now = current_timestamp_ms();
        let expiry = self.expiry.snapshot();
        {
            let table = self.segment_for(key).read();
            match table.slot(key) {
                None => {
                    self.stats.record_miss();
                    return None;
                }
                Some(slot) if !slot.entry.is_expired_at(&expiry, now) => {
                    slot.touch(now);
                    self.stats.record_hit();
                    return Some(table.snapshot_slot(slot));
                }
                Some(_) => {}
            }
        }
        self.stats.record_miss();
        self.expire_key(key, now);
        None
    }

    fn get_quiet(&self, key: &K) -> Option<Entry<K, V>> {
        let now = current_timestamp_ms();
        let expiry = self.expiry.snapshot();
        let table = self.segment_for(key).read();
        table
            .slot(key)
            .filter(|slot| !slot.entry.is_expired_at(&expiry, now))
            .map(|slot| table.snapshot_slot(slot))
    }

    fn remove(&self, key: &K) -> Result<Option<Entry<K, V>>> {
        let mut table = self.segment_for(key).write();
        let Some(entry) = table.remove(key) else {
            return Ok(None);
        };
        self.accessor.delete(key)?;
        self.stats.record_removal();
        Ok(Some(entry))
    }

    fn remove_all(&self) -> Result<()> {
        for segment in self.segments.iter() {
            let mut table = segment.write();
            for entry in table.drain() {
                self.accessor.delete(entry.key())?;
                self.stats.record_removal();
            }
        }
        debug!(store = %self.name, "all entries removed");
        Ok(())
    }

    fn size(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.read().len() as u64)
            .sum()
    }

    fn quick_size(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.quick_len() as u64)
            .sum()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.get_quiet(key).is_some()
    }

    fn dispose(&self) {
        SegmentedStore::dispose(self)
    }

    fn set_pinned(&self, key: &K, pinned: bool) {
        self.segment_for(key).write().set_pinned(key, pinned);
    }

    fn is_pinned(&self, key: &K) -> bool {
        self.store_pinned || self.segment_for(key).read().is_pinned(key)
    }

    fn unpin_all(&self) {
        for segment in self.segments.iter() {
            segment.write().unpin_all();
        }
        debug!(store = %self.name, "all keys unpinned");
    }

    fn keys(&self) -> Box<dyn Iterator<Item = K> + '_> {
        Box::new(self.segments.iter().flat_map(|segment| segment.read().keys()))
    }
}

// == Authoritative Tier ==
impl<K: CacheKey, V: CacheValue> AuthoritativeTier<K, V> for SegmentedStore<K, V> {
    fn pool(&self) -> &Pool {
        self.accessor.pool()
    }

    fn fault(&self, key: &K, update_stats: bool) -> Option<Entry<K, V>> {
        let now = current_timestamp_ms();
        let expiry = self.expiry.snapshot();
        {
            let table = self.segment_for(key).read();
            match table.slot(key) {
                None => {
                    if update_stats {
                        self.stats.record_miss();
                    }
                    return None;
                }
                Some(slot) if !slot.entry.is_expired_at(&expiry, now) => {
                    slot.mark_faulted();
                    if update_stats {
                        slot.touch(now);
                        self.stats.record_hit();
                    }
                    self.stats.record_fault();
                    debug!(store = %self.name, "entry faulted");
                    return Some(table.snapshot_slot(slot));
                }
                Some(_) => {}
            }
        }
        if update_stats {
            self.stats.record_miss();
        }
        self.expire_key(key, now);
        None
    }

    fn put_faulted(&self, entry: Entry<K, V>) -> Result<bool> {
        match self.insert_entry(entry, true, None) {
            Ok(_) => Ok(true),
            Err(err) if err.is_recoverable() => {
                warn!(store = %self.name, %err, "faulted put not admitted");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn flush(&self, entry: &Entry<K, V>) -> bool {
        let now = current_timestamp_ms();
        let expiry = self.expiry.snapshot();
        let (flushed, expired) = {
            let table = self.segment_for(entry.key()).read();
            let Some(slot) = table.slot(entry.key()) else {
                debug!(store = %self.name, "flush of absent entry");
                return false;
            };
            if slot.entry.version() != entry.version() {
                debug!(store = %self.name, "flush of superseded entry");
                return false;
            }
            slot.entry.absorb_access(entry);
            (slot.clear_faulted(), slot.entry.is_expired_at(&expiry, now))
        };
        if flushed {
            self.stats.record_flush();
            debug!(store = %self.name, "entry flushed");
        }
        if expired {
            self.expire_key(entry.key(), now);
        }
        flushed
    }
}

// == Pool Participant ==
impl<K: CacheKey, V: CacheValue> PoolParticipant for SegmentedStore<K, V> {
    fn evict(&self, count: usize, _units: u64) -> bool {
        if self.is_disposed() {
            return false;
        }
        match self.sweep(count, false, None) {
            Ok(removals) => {
                let evicted = !removals.is_empty();
                self.notify(removals);
                evicted
            }
            Err(err) => {
                error!(store = %self.name, %err, "pool eviction failed");
                false
            }
        }
    }

    fn approximate_count(&self) -> u64 {
        self.quick_size()
    }

    fn approximate_hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// == Managed Store ==
impl<K: CacheKey, V: CacheValue> ManagedStore for SegmentedStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dispose(&self) {
        SegmentedStore::dispose(self)
    }

    fn evict_expired(&self) -> usize {
        SegmentedStore::evict_expired(self)
    }

    fn stats(&self) -> StoreStats {
        SegmentedStore::stats(self)
    }
}
