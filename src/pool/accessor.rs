//! Pool Accessor Module
//!
//! A store's private ledger against a [`Pool`]. The accessor remembers what
//! each key cost when it was last admitted so replacements are charged by
//! delta and removals release exactly what was recorded.

use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use super::{AccessorState, Pool, SizeOf, SizeOfEngine};
use crate::error::{CacheError, Result};

// == Pool Accessor ==
/// Per-store handle into a pool.
///
/// Calls for the same key must be serialized by the owning store (stores
/// call the accessor under the key's segment lock).
pub struct PoolAccessor<K> {
    id: u64,
    pool: Pool,
    engine: SizeOfEngine,
    state: Arc<AccessorState>,
    ledger: DashMap<K, u64>,
}

impl<K> std::fmt::Debug for PoolAccessor<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAccessor")
            .field("id", &self.id)
            .field("pool", &self.pool.name())
            .field("size", &self.state.consumed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K: Eq + Hash> PoolAccessor<K> {
    pub(crate) fn new(id: u64, pool: Pool, engine: SizeOfEngine, state: Arc<AccessorState>) -> Self {
        Self {
            id,
            pool,
            engine,
            state,
            ledger: DashMap::new(),
        }
    }
}

impl<K> PoolAccessor<K> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn engine(&self) -> SizeOfEngine {
        self.engine
    }

    // == Size ==
    /// Units currently charged to this accessor.
    pub fn size(&self) -> u64 {
        self.state.consumed.load(Ordering::Acquire)
    }

    /// False once the accessor was unlinked from its pool.
    pub fn is_linked(&self) -> bool {
        self.state.linked.load(Ordering::Acquire)
    }

    // == Unlink ==
    /// Detaches from the pool, returning everything still accounted.
    pub fn unlink(&self) {
        if self.is_linked() {
            self.pool.unregister(self.id);
        }
    }

    /// Takes `units` off this accessor and then off the pool.
    ///
    /// Whoever wins the decrement on the accessor owns the matching pool
    /// release, so a concurrent unlink never releases the same units twice.
    fn release_units(&self, units: u64) -> Result<()> {
        let mut current = self.state.consumed.load(Ordering::Acquire);
        loop {
            if current < units {
                if !self.is_linked() {
                    // already returned to the pool by unlink
                    return Ok(());
                }
                error!(
                    accessor = self.id,
                    pool = %self.pool.name(),
                    consumed = current,
                    units,
                    "accessor release exceeds recorded consumption"
                );
                return Err(CacheError::Accounting(format!(
                    "accessor {} asked to release {} units while holding {}",
                    self.id, units, current
                )));
            }
            match self.state.consumed.compare_exchange_weak(
                current,
                current - units,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.pool.release(units)
    }

    /// Records `units` already taken from the pool.
    fn charge_units(&self, units: u64) -> Result<()> {
        self.state.consumed.fetch_add(units, Ordering::AcqRel);
        if !self.is_linked() {
            // lost a race with unlink; hand the units straight back
            self.release_units(units)?;
            return Err(CacheError::Disposed);
        }
        Ok(())
    }
}

impl<K: Eq + Hash + Clone> PoolAccessor<K> {
    // == Add ==
    /// Admits a candidate entry and charges it to this accessor.
    ///
    /// # Arguments
    /// * `key` - Key of the entry; a replace is charged relative to the
    ///   size recorded for this key
    /// * `value` - Value of the entry
    /// * `overhead` - Store-side bookkeeping bytes for the entry
    /// * `force` - Charge even if the pool is over budget
    ///
    /// # Returns
    /// The signed delta applied to the pool, or `Rejected` if eviction could
    /// not make room. Nothing is recorded on rejection.
    pub fn add<V: SizeOf>(&self, key: &K, value: &V, overhead: u64, force: bool) -> Result<i64>
    where
        K: SizeOf,
    {
        if !self.is_linked() {
            return Err(CacheError::Disposed);
        }
        let size = self.engine.size_of(key, value, overhead)?;
        let previous = self.ledger.get(key).map(|recorded| *recorded).unwrap_or(0);

        if size > previous {
            let grow = size - previous;
            if force {
                self.pool.consume_forced(grow);
            } else {
                self.pool.reserve(grow)?;
            }
            self.charge_units(grow)?;
        } else if size < previous {
            self.release_units(previous - size)?;
        }

        self.ledger.insert(key.clone(), size);
        Ok(size as i64 - previous as i64)
    }

    // == Delete ==
    /// Releases the recorded cost of `key`.
    ///
    /// Never rejected. Deleting a key that was never recorded frees nothing.
    pub fn delete(&self, key: &K) -> Result<u64> {
        match self.ledger.remove(key) {
            Some((_, size)) => {
                self.release_units(size)?;
                Ok(size)
            }
            None => {
                debug!(accessor = self.id, "delete of unrecorded key frees nothing");
                Ok(0)
            }
        }
    }

    /// Size recorded for `key`, if any.
    pub fn recorded(&self, key: &K) -> Option<u64> {
        self.ledger.get(key).map(|recorded| *recorded)
    }

    // == Clear ==
    /// Releases everything this accessor accounted.
    ///
    /// Returns the units freed.
    pub fn clear(&self) -> Result<u64> {
        self.ledger.clear();
        let consumed = self.state.consumed.swap(0, Ordering::AcqRel);
        if consumed > 0 && self.is_linked() {
            self.pool.release(consumed)?;
        }
        Ok(consumed)
    }
}

impl<K> Drop for PoolAccessor<K> {
    fn drop(&mut self) {
        self.unlink();
    }
}
