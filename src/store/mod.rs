//! Store Module
//!
//! Provides the segmented, pool-accounted concurrent store and the tiered
//! composition that puts one store in front of an authoritative one.

mod copy;
mod entry;
mod policy;
mod segment;
mod segmented;
mod stats;
mod tiered;


use std::hash::Hash;

use crate::error::Result;
use crate::pool::{Pool, SizeOf};

// Re-export public types
pub use copy::{CloneCopier, JsonCopier, ValueCopier};
pub use entry::{current_timestamp_ms, Entry, ExpirySettings};
pub use policy::EvictionPolicy;
pub use segmented::{Install, SegmentedStore};
pub use stats::StoreStats;
pub use tiered::TieredStore;

// == Public Constants ==
/// Victims removed under one segment lock per put before falling back
pub const MAX_EVICTION_RUNS: usize = 5;

/// Eligible slots compared by the sampled eviction policies
pub const SAMPLE_SIZE: usize = 30;

/// Largest allowed segment count
pub const MAX_SEGMENTS: usize = 256;

// == Key / Value Bounds ==
/// Requirements on store keys.
pub trait CacheKey: Eq + Hash + Clone + SizeOf + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + SizeOf + Send + Sync + 'static> CacheKey for T {}

/// Requirements on store values.
pub trait CacheValue: SizeOf + Send + Sync + 'static {}

impl<T: SizeOf + Send + Sync + 'static> CacheValue for T {}

// == Store ==
/// The contract every tier exposes.
pub trait Store<K, V>: Send + Sync {
    /// Inserts or replaces, returning the previous entry.
    fn put(&self, entry: Entry<K, V>) -> Result<Option<Entry<K, V>>>;

    /// Reads an entry, updating its access metadata.
    fn get(&self, key: &K) -> Option<Entry<K, V>>;

    /// Reads an entry without touching statistics or access metadata.
    fn get_quiet(&self, key: &K) -> Option<Entry<K, V>>;

    fn remove(&self, key: &K) -> Result<Option<Entry<K, V>>>;

    fn remove_all(&self) -> Result<()>;

    /// Exact entry count, read under every segment lock.
    fn size(&self) -> u64;

    /// Lock-free entry count estimate.
    fn quick_size(&self) -> u64;

    fn contains_key(&self, key: &K) -> bool;

    /// Releases all entries and detaches from the pool.
    fn dispose(&self);

    /// Pins or unpins a key, present or not. Pool accounting is unchanged.
    fn set_pinned(&self, key: &K, pinned: bool);

    fn is_pinned(&self, key: &K) -> bool;

    fn unpin_all(&self);

    /// Lazy, weakly consistent key sequence; each segment is snapshotted
    /// when the iterator reaches it.
    fn keys(&self) -> Box<dyn Iterator<Item = K> + '_>;
}

// == Authoritative Tier ==
/// A store that holds every entry and lends them to a faster tier.
pub trait AuthoritativeTier<K, V>: Store<K, V> {
    /// Hands out `key` to a faster tier, marking it in flight.
    ///
    /// In-flight entries are never evicted until flushed back.
    fn fault(&self, key: &K, update_stats: bool) -> Option<Entry<K, V>>;

    /// Stores an entry that a faster tier is about to hold, already in flight.
    ///
    /// Returns false if the entry could not be admitted.
    fn put_faulted(&self, entry: Entry<K, V>) -> Result<bool>;

    /// Takes back an entry from a faster tier, making it evictable again.
    ///
    /// Returns false if the entry no longer matches what this tier holds.
    fn flush(&self, entry: &Entry<K, V>) -> bool;

    /// The pool this tier is charged to.
    fn pool(&self) -> &Pool;
}

// == Eviction Listener ==
/// Notified after an entry left a store without being removed explicitly.
///
/// Called after the segment lock is released.
pub trait EvictionListener<K, V>: Send + Sync {
    fn evicted(&self, entry: &Entry<K, V>);

    fn expired(&self, _entry: &Entry<K, V>) {}
}

// == Managed Store ==
/// Type-erased view used by the manager and background tasks.
pub trait ManagedStore: Send + Sync {
    fn name(&self) -> &str;

    fn dispose(&self);

    /// Removes every expired entry that is not in flight.
    fn evict_expired(&self) -> usize;

    fn stats(&self) -> StoreStats;
}
