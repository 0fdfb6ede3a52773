//! Segment Module
//!
//! One lock-guarded shard of a segmented store. A segment owns a dense slot
//! table indexed by key, the set of keys pinned in this shard, and the
//! clock hand used to sample eviction victims.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::entry::{Entry, ExpirySettings};
use super::policy::EvictionPolicy;
use super::SAMPLE_SIZE;

// == Slot ==
/// An entry plus the per-slot flags victim selection looks at.
#[derive(Debug)]
pub(crate) struct Slot<K, V> {
    pub(crate) entry: Entry<K, V>,
    /// Clock reference bit, set on read
    accessed: AtomicBool,
    /// Faults handed to a faster tier and not yet flushed back
    in_flight: AtomicU32,
}

impl<K, V> Slot<K, V> {
    fn new(entry: Entry<K, V>, faulted: bool) -> Self {
        Self {
            entry,
            accessed: AtomicBool::new(false),
            in_flight: AtomicU32::new(u32::from(faulted)),
        }
    }

    /// Records a read of this slot.
    pub(crate) fn touch(&self, now: u64) {
        self.accessed.store(true, Ordering::Relaxed);
        self.entry.touch(now);
    }

    pub(crate) fn is_faulted(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Records one more outstanding fault. Every fault is balanced by one
    /// flush, so overlapping faults of the same entry keep it in flight.
    pub(crate) fn mark_faulted(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Balances one fault; false if none was outstanding.
    pub(crate) fn clear_faulted(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

// == Victim ==
/// Slot chosen for removal and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Victim {
    pub(crate) index: usize,
    /// Removal is an expiry rather than an eviction
    pub(crate) expired: bool,
}

/// What victim selection must leave alone.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VictimFilter<'a, K> {
    pub(crate) policy: EvictionPolicy,
    pub(crate) exclude: Option<&'a K>,
    pub(crate) expiry: ExpirySettings,
    pub(crate) now: u64,
    /// Whole-store pinning: only expired entries may go
    pub(crate) store_pinned: bool,
}

// == Table ==
/// The data guarded by a segment's lock.
#[derive(Debug)]
pub(crate) struct Table<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    hand: usize,
    pinned: HashSet<K>,
}

impl<K: Eq + Hash + Clone, V> Table<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            hand: 0,
            pinned: HashSet::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, key: &K) -> Option<&Slot<K, V>> {
        self.index.get(key).map(|&index| &self.slots[index])
    }

    pub(crate) fn slot_at(&self, index: usize) -> &Slot<K, V> {
        &self.slots[index]
    }

    /// Copy of the entry at `key` with its pinned flag filled in.
    pub(crate) fn snapshot(&self, key: &K) -> Option<Entry<K, V>> {
        self.slot(key).map(|slot| self.snapshot_slot(slot))
    }

    pub(crate) fn snapshot_slot(&self, slot: &Slot<K, V>) -> Entry<K, V> {
        let mut entry = slot.entry.clone();
        entry.set_pinned_flag(self.pinned.contains(slot.entry.key()));
        entry
    }

    // == Insert / Remove ==
    /// Inserts or replaces, returning the replaced entry.
    ///
    /// A replace keeps the slot position so the clock hand is undisturbed.
    pub(crate) fn insert(&mut self, entry: Entry<K, V>, faulted: bool) -> Option<Entry<K, V>> {
        match self.index.get(entry.key()) {
            Some(&index) => {
                let previous = std::mem::replace(&mut self.slots[index], Slot::new(entry, faulted));
                Some(previous.entry)
            }
            None => {
                self.index.insert(entry.key().clone(), self.slots.len());
                self.slots.push(Slot::new(entry, faulted));
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        let index = self.index.remove(key)?;
        Some(self.remove_index(index))
    }

    /// Removes the slot at `index`, keeping the index dense.
    pub(crate) fn remove_at(&mut self, index: usize) -> Entry<K, V> {
        let key = self.slots[index].entry.key().clone();
        self.index.remove(&key);
        self.remove_index(index)
    }

    fn remove_index(&mut self, index: usize) -> Entry<K, V> {
        let removed = self.slots.swap_remove(index);
        if let Some(moved) = self.slots.get(index) {
            self.index.insert(moved.entry.key().clone(), index);
        }
        if self.hand >= self.slots.len() {
            self.hand = 0;
        }
        removed.entry
    }

    /// Empties the table and returns every entry it held. Pins survive.
    pub(crate) fn drain(&mut self) -> Vec<Entry<K, V>> {
        self.index.clear();
        self.hand = 0;
        self.slots.drain(..).map(|slot| slot.entry).collect()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|slot| slot.entry.key().clone()).collect()
    }

    // == Pinning ==
    pub(crate) fn is_pinned(&self, key: &K) -> bool {
        self.pinned.contains(key)
    }

    /// Records or clears a pin; the key need not be present.
    pub(crate) fn set_pinned(&mut self, key: &K, pinned: bool) {
        if pinned {
            self.pinned.insert(key.clone());
        } else {
            self.pinned.remove(key);
        }
    }

    pub(crate) fn unpin_all(&mut self) {
        self.pinned.clear();
    }

    pub(crate) fn pinned_keys(&self) -> usize {
        self.pinned.len()
    }

    /// Pinned keys that currently hold an entry.
    pub(crate) fn pinned_present(&self) -> usize {
        self.pinned.iter().filter(|key| self.index.contains_key(*key)).count()
    }

    /// Indices of expired entries that are not in flight.
    pub(crate) fn expired(&self, expiry: &ExpirySettings, now: u64) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_faulted() && slot.entry.is_expired_at(expiry, now))
            .map(|(index, _)| index)
            .collect()
    }

    // == Victim Selection ==
    /// Picks one slot to remove, or `None` if nothing is evictable.
    ///
    /// In-flight and excluded slots are never chosen. Pinned slots are only
    /// chosen when already expired.
    pub(crate) fn select_victim(&mut self, filter: &VictimFilter<'_, K>) -> Option<Victim> {
        if self.slots.is_empty() {
            return None;
        }
        if filter.policy.is_sampled() {
            self.sample_victim(filter)
        } else {
            self.clock_victim(filter)
        }
    }

    /// Eligibility of one slot: `None` to skip, `Some(expired)` otherwise.
    fn eligible(&self, slot: &Slot<K, V>, filter: &VictimFilter<'_, K>) -> Option<bool> {
        if slot.is_faulted() || filter.exclude == Some(slot.entry.key()) {
            return None;
        }
        if slot.entry.is_expired_at(&filter.expiry, filter.now) {
            return Some(true);
        }
        if filter.store_pinned || self.pinned.contains(slot.entry.key()) {
            return None;
        }
        Some(false)
    }

    /// Second-chance sweep: a referenced slot loses its bit and is passed.
    fn clock_victim(&mut self, filter: &VictimFilter<'_, K>) -> Option<Victim> {
        let len = self.slots.len();
        for _ in 0..len * 2 {
            let index = self.hand % len;
            self.hand = (index + 1) % len;
            let slot = &self.slots[index];
            match self.eligible(slot, filter) {
                None => continue,
                Some(true) => return Some(Victim { index, expired: true }),
                Some(false) => {
                    if slot.accessed.swap(false, Ordering::Relaxed) {
                        continue;
                    }
                    return Some(Victim { index, expired: false });
                }
            }
        }
        None
    }

    /// Best of a sample of eligible slots under the policy ordering.
    fn sample_victim(&mut self, filter: &VictimFilter<'_, K>) -> Option<Victim> {
        let len = self.slots.len();
        let start = self.hand % len;
        let mut best: Option<usize> = None;
        let mut sampled = 0;
        let mut inspected = 0;

        while inspected < len && sampled < SAMPLE_SIZE {
            let index = (start + inspected) % len;
            inspected += 1;
            match self.eligible(&self.slots[index], filter) {
                None => continue,
                Some(true) => {
                    self.hand = (index + 1) % len;
                    return Some(Victim { index, expired: true });
                }
                Some(false) => {
                    sampled += 1;
                    let better = best.map_or(true, |current| {
                        filter
                            .policy
                            .compare(&self.slots[index].entry, &self.slots[current].entry)
                            .is_lt()
                    });
                    if better {
                        best = Some(index);
                    }
                }
            }
        }

        self.hand = (start + inspected) % len;
        best.map(|index| Victim { index, expired: false })
    }
}

// == Segment ==
/// A table behind its own lock, with a lock-free live count.
#[derive(Debug)]
pub(crate) struct Segment<K, V> {
    table: RwLock<Table<K, V>>,
    count: AtomicUsize,
}

impl<K: Eq + Hash + Clone, V> Segment<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            table: RwLock::new(Table::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// Live count without taking the lock.
    pub(crate) fn quick_len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Table<K, V>> {
        self.table.read()
    }

    pub(crate) fn write(&self) -> SegmentWriteGuard<'_, K, V> {
        SegmentWriteGuard {
            guard: self.table.write(),
            count: &self.count,
        }
    }

    /// Non-blocking write lock, used from pool-driven eviction.
    pub(crate) fn try_write(&self) -> Option<SegmentWriteGuard<'_, K, V>> {
        self.table.try_write().map(|guard| SegmentWriteGuard {
            guard,
            count: &self.count,
        })
    }
}

// == Write Guard ==
/// Write access that republishes the live count when released.
pub(crate) struct SegmentWriteGuard<'a, K, V> {
    guard: RwLockWriteGuard<'a, Table<K, V>>,
    count: &'a AtomicUsize,
}

impl<K, V> SegmentWriteGuard<'_, K, V> {
    /// Publishes the live count before the lock is released.
    pub(crate) fn sync(&self) {
        self.count.store(self.guard.slots.len(), Ordering::Release);
    }
}

impl<K, V> Deref for SegmentWriteGuard<'_, K, V> {
    type Target = Table<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<K, V> DerefMut for SegmentWriteGuard<'_, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<K, V> Drop for SegmentWriteGuard<'_, K, V> {
    fn drop(&mut self) {
        self.sync();
    }
}
