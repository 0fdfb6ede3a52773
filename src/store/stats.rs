//! Store Statistics Module
//!
//! Tracks store performance counters (hits, misses, evictions, faults) and
//! produces serializable snapshots of them.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Stats Recorder ==
/// Lock-free counters updated on the store's hot paths.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    faults: AtomicU64,
    flushes: AtomicU64,
    rejections: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit rate over the store's lifetime.
    pub(crate) fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        ratio(hits, misses)
    }

    pub(crate) fn snapshot(&self, name: &str, entries: u64, pinned: u64, pool_size: u64) -> StoreStats {
        StoreStats {
            name: name.to_string(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            entries,
            pinned,
            pool_size,
            taken_at: Utc::now(),
        }
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Store Stats ==
/// Point-in-time view of a store's counters.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub name: String,
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry)
    pub misses: u64,
    pub puts: u64,
    pub removals: u64,
    /// Entries removed to make room
    pub evictions: u64,
    pub expirations: u64,
    /// Entries handed to a faster tier
    pub faults: u64,
    /// Entries handed back by a faster tier
    pub flushes: u64,
    /// Puts refused by the pool
    pub rejections: u64,
    /// Approximate number of entries held
    pub entries: u64,
    /// Keys currently pinned
    pub pinned: u64,
    /// Units charged to the store's pool accessor
    pub pool_size: u64,
    pub taken_at: DateTime<Utc>,
}

impl StoreStats {
    // == Hit Rate ==
    /// Calculates the hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads were made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.misses)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_starts_at_zero() {
        let recorder = StatsRecorder::default();
        let stats = recorder.snapshot("s", 0, 0, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = StatsRecorder::default();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        assert_eq!(recorder.hit_rate(), 0.75);
        assert_eq!(recorder.snapshot("s", 0, 0, 0).hit_rate(), 0.75);
    }

    #[test]
    fn test_snapshot_copies_counters() {
        let recorder = StatsRecorder::default();
        recorder.record_put();
        recorder.record_eviction();
        recorder.record_expiration();
        recorder.record_fault();
        recorder.record_flush();
        recorder.record_rejection();
        recorder.record_removal();

        let stats = recorder.snapshot("heap", 12, 2, 4096);
        assert_eq!(stats.name, "heap");
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.rejections, 1);
        assert_eq!(stats.removals, 1);
        assert_eq!(stats.entries, 12);
        assert_eq!(stats.pinned, 2);
        assert_eq!(stats.pool_size, 4096);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = StatsRecorder::default().snapshot("heap", 1, 0, 10);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["name"], "heap");
        assert_eq!(json["entries"], 1);
        assert!(json["taken_at"].is_string());
    }
}
