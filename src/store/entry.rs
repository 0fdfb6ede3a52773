//! Cache Entry Module
//!
//! Defines the stored key/value pair with its access metadata and the
//! store-wide expiry defaults entries are evaluated against.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

// == Cache Entry ==
/// A key, a shared value and metadata.
///
/// Access bookkeeping (`last_access`, `hit_count`) is updated in place on
/// every read; everything else is replaced wholesale on update.
#[derive(Debug)]
pub struct Entry<K, V> {
    key: K,
    value: Arc<V>,
    version: u64,
    /// Creation timestamp (Unix milliseconds)
    created_at: u64,
    /// Last update timestamp (Unix milliseconds)
    last_update: u64,
    /// Last access timestamp (Unix milliseconds), 0 = never read
    last_access: AtomicU64,
    hit_count: AtomicU64,
    /// Time-to-live override in seconds
    ttl: Option<u64>,
    /// Time-to-idle override in seconds
    tti: Option<u64>,
    eternal: bool,
    pinned: bool,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(key: K, value: V) -> Self {
        Self::from_arc(key, Arc::new(value))
    }

    /// Creates a new entry around an already shared value.
    pub fn from_arc(key: K, value: Arc<V>) -> Self {
        let now = current_timestamp_ms();
        Self {
            key,
            value,
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            created_at: now,
            last_update: now,
            last_access: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            ttl: None,
            tti: None,
            eternal: false,
            pinned: false,
        }
    }

    // == Builders ==
    /// Overrides the store's time-to-live (seconds, 0 = never expires by age).
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// Overrides the store's time-to-idle (seconds, 0 = never expires idle).
    pub fn with_tti(mut self, seconds: u64) -> Self {
        self.tti = Some(seconds);
        self
    }

    pub fn with_eternal(mut self, eternal: bool) -> Self {
        self.eternal = eternal;
        self
    }

    /// Asks the store to pin the key when this entry is put.
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    /// Same metadata, different value (used by copy strategies).
    pub fn with_value(&self, value: V) -> Self
    where
        K: Clone,
    {
        let mut copy = self.clone();
        copy.value = Arc::new(value);
        copy
    }

    #[cfg(test)]
    pub(crate) fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self.last_update = created_at;
        self
    }

    // == Getters ==
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Shared handle to the value.
    pub fn value_arc(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    pub fn tti(&self) -> Option<u64> {
        self.tti
    }

    pub fn is_eternal(&self) -> bool {
        self.eternal
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub(crate) fn set_pinned_flag(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    // == Access Bookkeeping ==
    /// Records a read at `now`.
    pub fn touch(&self, now: u64) {
        self.last_access.store(now, Ordering::Relaxed);
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes over access statistics gathered by another tier's copy.
    pub(crate) fn absorb_access(&self, other: &Entry<K, V>) {
        self.last_access
            .fetch_max(other.last_access(), Ordering::Relaxed);
        self.hit_count.fetch_max(other.hit_count(), Ordering::Relaxed);
    }

    /// Last access, or creation if never read.
    pub fn last_used(&self) -> u64 {
        self.last_access().max(self.created_at)
    }

    // == Expiry ==
    /// Checks expiry against the store defaults at `now`.
    ///
    /// Entry overrides win over the defaults. An entry is expired once the
    /// current time is greater than or equal to its expiration time.
    pub fn is_expired_at(&self, defaults: &ExpirySettings, now: u64) -> bool {
        if self.eternal || defaults.eternal {
            return false;
        }
        let ttl = self.ttl.unwrap_or(defaults.ttl);
        if ttl > 0 && now >= self.created_at.saturating_add(ttl.saturating_mul(1000)) {
            return true;
        }
        let tti = self.tti.unwrap_or(defaults.tti);
        tti > 0 && now >= self.last_used().saturating_add(tti.saturating_mul(1000))
    }

    /// Checks expiry against the store defaults now.
    pub fn is_expired(&self, defaults: &ExpirySettings) -> bool {
        self.is_expired_at(defaults, current_timestamp_ms())
    }
}

impl<K: Clone, V> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            version: self.version,
            created_at: self.created_at,
            last_update: self.last_update,
            last_access: AtomicU64::new(self.last_access()),
            hit_count: AtomicU64::new(self.hit_count()),
            ttl: self.ttl,
            tti: self.tti,
            eternal: self.eternal,
            pinned: self.pinned,
        }
    }
}

// == Expiry Settings ==
/// Snapshot of the store-wide expiry defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirySettings {
    /// Default time-to-live in seconds, 0 = none
    pub ttl: u64,
    /// Default time-to-idle in seconds, 0 = none
    pub tti: u64,
    pub eternal: bool,
}

/// Live expiry defaults; changes apply lazily on next evaluation.
#[derive(Debug, Default)]
pub(crate) struct ExpiryDefaults {
    ttl: AtomicU64,
    tti: AtomicU64,
    eternal: AtomicBool,
}

impl ExpiryDefaults {
    pub(crate) fn new(settings: ExpirySettings) -> Self {
        Self {
            ttl: AtomicU64::new(settings.ttl),
            tti: AtomicU64::new(settings.tti),
            eternal: AtomicBool::new(settings.eternal),
        }
    }

    pub(crate) fn snapshot(&self) -> ExpirySettings {
        ExpirySettings {
            ttl: self.ttl.load(Ordering::Relaxed),
            tti: self.tti.load(Ordering::Relaxed),
            eternal: self.eternal.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_ttl(&self, seconds: u64) -> u64 {
        self.ttl.swap(seconds, Ordering::Relaxed)
    }

    pub(crate) fn set_tti(&self, seconds: u64) -> u64 {
        self.tti.swap(seconds, Ordering::Relaxed)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
