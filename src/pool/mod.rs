//! Pool Module
//!
//! A pool is a shared resource budget (bytes or entry count) that spans
//! every store holding an accessor against it. The pool is the single source
//! of truth for aggregate consumption; stores only change it through their
//! [`PoolAccessor`].
//!
//! Pools are explicitly constructed and shared by cloning the handle. They
//! hold only non-owning registrations of their participants.

mod accessor;
mod evictor;
mod sizeof;

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{CacheError, Result};

pub use accessor::PoolAccessor;
pub use evictor::{Evictor, EvictorKind, MAX_EVICTION_BATCH};
pub use sizeof::{deep_size_of, SizeOf, SizeOfEngine, SizeOfError, SizeWalker, DEFAULT_MAX_SIZEOF_DEPTH};

use evictor::Candidate;

// == Public Constants ==
/// Eviction rounds attempted before an admission request is rejected
pub const DEFAULT_EVICTION_ATTEMPTS: usize = 16;

// == Pool Participant ==
/// A store that can be asked by a pool to give back space.
pub trait PoolParticipant: Send + Sync {
    /// Evicts up to `count` entries, aiming to release `units`.
    ///
    /// Returns true if anything was evicted. Must not block on locks the
    /// calling thread may already hold.
    fn evict(&self, count: usize, units: u64) -> bool;

    /// Best-effort number of entries held.
    fn approximate_count(&self) -> u64;

    /// Hit rate in `[0, 1]`, used to break ties between equal consumers.
    fn approximate_hit_rate(&self) -> f64;

    fn name(&self) -> &str;
}

// == Accessor State ==
/// Consumption shared between an accessor and its registration.
#[derive(Debug, Default)]
pub(crate) struct AccessorState {
    pub(crate) consumed: AtomicU64,
    pub(crate) linked: AtomicBool,
}

struct Registration {
    id: u64,
    state: Arc<AccessorState>,
    participant: Weak<dyn PoolParticipant>,
}

struct PoolInner {
    name: String,
    max_size: AtomicU64,
    size: AtomicU64,
    evictor: Evictor,
    engine: SizeOfEngine,
    eviction_attempts: usize,
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

// == Pool ==
/// Shared handle to a resource budget. Cloning shares the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("size", &self.size())
            .field("max_size", &self.max_size())
            .field("accessors", &self.accessor_count())
            .finish()
    }
}

impl Pool {
    // == Constructors ==
    /// Creates a bounded pool.
    ///
    /// # Arguments
    /// * `name` - Name used in logs
    /// * `max_size` - Budget in the units of `engine`
    /// * `evictor` - Cross-store victim selection policy
    /// * `engine` - Default sizing engine for accessors
    pub fn new(name: impl Into<String>, max_size: u64, evictor: EvictorKind, engine: SizeOfEngine) -> Self {
        let name = name.into();
        info!(pool = %name, max_size, ?evictor, ?engine, "pool created");
        Self {
            inner: Arc::new(PoolInner {
                name,
                max_size: AtomicU64::new(max_size),
                size: AtomicU64::new(0),
                evictor: Evictor::new(evictor),
                engine,
                eviction_attempts: DEFAULT_EVICTION_ATTEMPTS,
                registrations: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a pool that never rejects; it only keeps accounts.
    pub fn unbounded(name: impl Into<String>, engine: SizeOfEngine) -> Self {
        Self::new(name, u64::MAX, EvictorKind::FromLargest, engine)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn engine(&self) -> SizeOfEngine {
        self.inner.engine
    }

    pub fn evictor(&self) -> EvictorKind {
        self.inner.evictor.kind()
    }

    // == Accessors ==
    /// Registers a new consumer using the pool's default sizing engine.
    pub fn create_accessor<K: Eq + Hash>(&self, participant: Weak<dyn PoolParticipant>) -> PoolAccessor<K> {
        self.create_accessor_with_engine(participant, self.inner.engine)
    }

    /// Registers a new consumer with its own sizing engine.
    pub fn create_accessor_with_engine<K: Eq + Hash>(
        &self,
        participant: Weak<dyn PoolParticipant>,
        engine: SizeOfEngine,
    ) -> PoolAccessor<K> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AccessorState {
            consumed: AtomicU64::new(0),
            linked: AtomicBool::new(true),
        });
        self.inner.registrations.write().push(Registration {
            id,
            state: Arc::clone(&state),
            participant,
        });
        debug!(pool = %self.inner.name, accessor = id, "accessor registered");
        PoolAccessor::new(id, self.clone(), engine, state)
    }

    /// Number of live accessors.
    pub fn accessor_count(&self) -> usize {
        self.inner.registrations.read().len()
    }

    // == Size ==
    /// Current aggregate consumption.
    pub fn size(&self) -> u64 {
        self.inner.size.load(Ordering::Acquire)
    }

    pub fn max_size(&self) -> u64 {
        self.inner.max_size.load(Ordering::Acquire)
    }

    /// Changes the budget, shrinking synchronously if now over it.
    ///
    /// Returns true if the pool fits the new budget afterwards. A shortfall
    /// after the bounded eviction rounds is logged and left in place.
    pub fn set_max_size(&self, max_size: u64) -> bool {
        let old = self.inner.max_size.swap(max_size, Ordering::AcqRel);
        info!(pool = %self.inner.name, old, new = max_size, "pool max size changed");

        for _ in 0..self.inner.eviction_attempts {
            let size = self.size();
            if size <= max_size {
                return true;
            }
            if !self.free_space(size - max_size) {
                break;
            }
        }

        let size = self.size();
        if size > max_size {
            warn!(
                pool = %self.inner.name,
                size,
                max_size,
                shortfall = size - max_size,
                "pool could not shrink to its new budget"
            );
            return false;
        }
        true
    }

    /// True if both handles refer to the same pool.
    pub fn same_pool(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // == Shutdown ==
    /// Forcibly releases every accessor's consumption.
    pub fn release_all(&self) {
        let registrations = std::mem::take(&mut *self.inner.registrations.write());
        for registration in registrations {
            self.release_registration(&registration);
        }
        info!(pool = %self.inner.name, size = self.size(), "pool released all accessors");
    }

    // == Internal Accounting ==
    /// Reserves `units`, running the evictor while over budget.
    pub(crate) fn reserve(&self, units: u64) -> Result<()> {
        let mut attempts = 0;
        loop {
            let current = self.inner.size.load(Ordering::Acquire);
            let max = self.max_size();
            let wanted = current.saturating_add(units);
            if wanted <= max {
                if self
                    .inner
                    .size
                    .compare_exchange_weak(current, wanted, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            if attempts >= self.inner.eviction_attempts || !self.free_space(wanted - max) {
                let available = max.saturating_sub(self.size());
                debug!(pool = %self.inner.name, units, available, "admission rejected");
                return Err(CacheError::Rejected {
                    requested: units,
                    available,
                });
            }
            attempts += 1;
        }
    }

    /// Adds `units` regardless of the budget.
    pub(crate) fn consume_forced(&self, units: u64) {
        self.inner.size.fetch_add(units, Ordering::AcqRel);
    }

    /// Returns `units` to the pool.
    pub(crate) fn release(&self, units: u64) -> Result<()> {
        let mut current = self.inner.size.load(Ordering::Acquire);
        loop {
            if current < units {
                error!(
                    pool = %self.inner.name,
                    size = current,
                    units,
                    "pool release exceeds aggregate consumption"
                );
                return Err(CacheError::Accounting(format!(
                    "pool '{}' asked to release {} units while holding {}",
                    self.inner.name, units, current
                )));
            }
            match self.inner.size.compare_exchange_weak(
                current,
                current - units,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Removes one accessor's registration and zeroes its consumption.
    pub(crate) fn unregister(&self, id: u64) {
        let removed = {
            let mut registrations = self.inner.registrations.write();
            registrations
                .iter()
                .position(|r| r.id == id)
                .map(|index| registrations.swap_remove(index))
        };
        if let Some(registration) = removed {
            self.release_registration(&registration);
            debug!(pool = %self.inner.name, accessor = id, "accessor unregistered");
        }
    }

    fn release_registration(&self, registration: &Registration) {
        registration.state.linked.store(false, Ordering::Release);
        let consumed = registration.state.consumed.swap(0, Ordering::AcqRel);
        if consumed > 0 {
            if let Err(err) = self.release(consumed) {
                error!(pool = %self.inner.name, accessor = registration.id, %err, "failed to release accessor");
            }
        }
    }

    /// One evictor round over the live participants.
    fn free_space(&self, units: u64) -> bool {
        let candidates: Vec<Candidate> = {
            let registrations = self.inner.registrations.read();
            registrations
                .iter()
                .filter_map(|r| {
                    r.participant.upgrade().map(|participant| Candidate {
                        participant,
                        consumed: r.state.consumed.load(Ordering::Acquire),
                    })
                })
                .collect()
        };
        self.inner.evictor.free_space(candidates, units)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Participant that frees a fixed number of units from its own accessor.
    struct Shedder {
        accessor: parking_lot::Mutex<Option<PoolAccessor<u64>>>,
        next_victim: AtomicUsize,
        evictable: bool,
    }

    impl PoolParticipant for Shedder {
        fn evict(&self, _count: usize, _units: u64) -> bool {
            if !self.evictable {
                return false;
            }
            let guard = self.accessor.lock();
            let Some(accessor) = guard.as_ref() else {
                return false;
            };
            let key = self.next_victim.fetch_add(1, Ordering::Relaxed) as u64;
            accessor.delete(&key).map(|freed| freed > 0).unwrap_or(false)
        }

        fn approximate_count(&self) -> u64 {
            1
        }

        fn approximate_hit_rate(&self) -> f64 {
            0.0
        }

        fn name(&self) -> &str {
            "shedder"
        }
    }

    fn shedder(pool: &Pool, evictable: bool) -> Arc<Shedder> {
        let shedder = Arc::new(Shedder {
            accessor: parking_lot::Mutex::new(None),
            next_victim: AtomicUsize::new(0),
            evictable,
        });
        let weak: Weak<dyn PoolParticipant> = Arc::downgrade(&shedder) as Weak<dyn PoolParticipant>;
        *shedder.accessor.lock() = Some(pool.create_accessor(weak));
        shedder
    }

    fn constant(units: u64) -> SizeOfEngine {
        SizeOfEngine::Constant {
            key: 0,
            value: units,
            container: 0,
        }
    }

    #[test]
    fn test_pool_new() {
        let pool = Pool::new("heap", 100, EvictorKind::FromLargest, SizeOfEngine::Unit);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.max_size(), 100);
        assert_eq!(pool.accessor_count(), 0);
    }

    #[test]
    fn test_reserve_within_budget() {
        let pool = Pool::new("heap", 10, EvictorKind::FromLargest, SizeOfEngine::Unit);
        pool.reserve(4).unwrap();
        pool.reserve(6).unwrap();
        assert_eq!(pool.size(), 10);
    }

    #[test]
    fn test_reserve_rejected_without_participants() {
        let pool = Pool::new("heap", 10, EvictorKind::FromLargest, SizeOfEngine::Unit);
        pool.reserve(8).unwrap();
        let err = pool.reserve(5).unwrap_err();
        assert_eq!(
            err,
            CacheError::Rejected {
                requested: 5,
                available: 2
            }
        );
        assert_eq!(pool.size(), 8);
    }

    #[test]
    fn test_reserve_evicts_from_participant() {
        let pool = Pool::new("heap", 20, EvictorKind::FromLargest, constant(10));
        let s = shedder(&pool, true);
        {
            let guard = s.accessor.lock();
            let accessor = guard.as_ref().unwrap();
            accessor.add(&0, &(), 0, false).unwrap();
            accessor.add(&1, &(), 0, false).unwrap();
        }
        assert_eq!(pool.size(), 20);

        pool.reserve(10).unwrap();
        assert_eq!(pool.size(), 20);
        assert_eq!(s.accessor.lock().as_ref().unwrap().size(), 10);
    }

    #[test]
    fn test_reserve_rejected_when_nothing_evictable() {
        let pool = Pool::new("heap", 10, EvictorKind::FromLargest, constant(10));
        let s = shedder(&pool, false);
        s.accessor.lock().as_ref().unwrap().add(&0, &(), 0, false).unwrap();
        assert!(matches!(pool.reserve(1), Err(CacheError::Rejected { .. })));
    }

    #[test]
    fn test_release_underflow_is_accounting_violation() {
        let pool = Pool::new("heap", 10, EvictorKind::FromLargest, SizeOfEngine::Unit);
        pool.reserve(2).unwrap();
        let err = pool.release(3).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_forced_consumption_can_exceed_budget() {
        let pool = Pool::new("heap", 1, EvictorKind::FromLargest, SizeOfEngine::Unit);
        pool.consume_forced(3);
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn test_set_max_size_shrinks() {
        let pool = Pool::new("heap", 30, EvictorKind::FromLargest, constant(10));
        let s = shedder(&pool, true);
        {
            let guard = s.accessor.lock();
            let accessor = guard.as_ref().unwrap();
            for key in 0..3u64 {
                accessor.add(&key, &(), 0, false).unwrap();
            }
        }
        assert!(pool.set_max_size(10));
        assert_eq!(pool.size(), 10);
        assert_eq!(pool.max_size(), 10);
    }

    #[test]
    fn test_set_max_size_reports_shortfall() {
        let pool = Pool::new("heap", 30, EvictorKind::FromLargest, constant(10));
        let s = shedder(&pool, false);
        s.accessor.lock().as_ref().unwrap().add(&0, &(), 0, false).unwrap();
        assert!(!pool.set_max_size(5));
        assert_eq!(pool.size(), 10);
    }

    #[test]
    fn test_release_all_zeroes_pool() {
        let pool = Pool::new("heap", 100, EvictorKind::FromLargest, constant(10));
        let a = shedder(&pool, true);
        let b = shedder(&pool, true);
        a.accessor.lock().as_ref().unwrap().add(&0, &(), 0, false).unwrap();
        b.accessor.lock().as_ref().unwrap().add(&0, &(), 0, false).unwrap();
        assert_eq!(pool.size(), 20);

        pool.release_all();
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.accessor_count(), 0);
        assert_eq!(a.accessor.lock().as_ref().unwrap().size(), 0);
    }

    #[test]
    fn test_unbounded_pool_never_rejects() {
        let pool = Pool::unbounded("disk", SizeOfEngine::Unit);
        pool.reserve(1 << 40).unwrap();
        assert_eq!(pool.size(), 1 << 40);
    }
}
