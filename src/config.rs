//! Configuration Module
//!
//! Handles loading the cache manager configuration from environment
//! variables and describing individual stores.

use std::env;
use std::str::FromStr;

use crate::pool::{EvictorKind, SizeOfEngine};
use crate::store::{EvictionPolicy, ExpirySettings, MAX_SEGMENTS};

/// Cache manager configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte budget shared by every heap store
    pub heap_max_bytes: u64,
    /// Entry cap of each heap store (0 = unbounded)
    pub heap_max_entries: u64,
    /// Byte budget shared by every disk-tier store
    pub disk_max_bytes: u64,
    /// Segments per store
    pub segments: usize,
    pub eviction_policy: EvictionPolicy,
    pub pool_evictor: EvictorKind,
    /// How both pools size their entries
    pub sizeof_engine: SizeOfEngine,
    /// Default TTL in seconds (0 = none)
    pub default_ttl: u64,
    /// Default TTI in seconds (0 = none)
    pub default_tti: u64,
    /// Background expiry task interval in seconds
    pub expiry_interval: u64,
    /// How long the soak run lasts in seconds
    pub soak_seconds: u64,
    /// Concurrent soak workers
    pub workers: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `HEAP_MAX_BYTES` - Heap pool budget in bytes (default: 64 MiB)
    /// - `HEAP_MAX_ENTRIES` - Entry cap per heap store (default: 10000)
    /// - `DISK_MAX_BYTES` - Disk pool budget in bytes (default: 512 MiB)
    /// - `SEGMENTS` - Segments per store (default: 16)
    /// - `EVICTION_POLICY` - clock, lru, lfu or fifo (default: clock)
    /// - `POOL_EVICTOR` - largest or round_robin (default: largest)
    /// - `SIZEOF_ENGINE` - deep (bytes) or unit (entry count) (default: deep)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 0)
    /// - `DEFAULT_TTI` - Default TTI in seconds (default: 0)
    /// - `EXPIRY_INTERVAL` - Expiry sweep frequency in seconds (default: 1)
    /// - `SOAK_SECONDS` - Soak run duration (default: 30)
    /// - `WORKERS` - Soak worker count (default: 4)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            heap_max_bytes: env_or("HEAP_MAX_BYTES", defaults.heap_max_bytes),
            heap_max_entries: env_or("HEAP_MAX_ENTRIES", defaults.heap_max_entries),
            disk_max_bytes: env_or("DISK_MAX_BYTES", defaults.disk_max_bytes),
            segments: env_or("SEGMENTS", defaults.segments),
            eviction_policy: env_or("EVICTION_POLICY", defaults.eviction_policy),
            pool_evictor: env_or("POOL_EVICTOR", defaults.pool_evictor),
            sizeof_engine: env_or("SIZEOF_ENGINE", defaults.sizeof_engine),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            default_tti: env_or("DEFAULT_TTI", defaults.default_tti),
            expiry_interval: env_or("EXPIRY_INTERVAL", defaults.expiry_interval),
            soak_seconds: env_or("SOAK_SECONDS", defaults.soak_seconds),
            workers: env_or("WORKERS", defaults.workers),
        }
    }

    /// Store configuration for a heap store named `name`.
    pub fn heap_store(&self, name: &str) -> StoreConfig {
        StoreConfig::new(name)
            .segments(self.segments)
            .max_entries(self.heap_max_entries)
            .policy(self.eviction_policy)
            .ttl(self.default_ttl)
            .tti(self.default_tti)
    }

    /// Store configuration for a disk-tier store named `name`.
    pub fn disk_store(&self, name: &str) -> StoreConfig {
        StoreConfig::new(name)
            .segments(self.segments)
            .policy(self.eviction_policy)
            .ttl(self.default_ttl)
            .tti(self.default_tti)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heap_max_bytes: 64 * 1024 * 1024,
            heap_max_entries: 10_000,
            disk_max_bytes: 512 * 1024 * 1024,
            segments: 16,
            eviction_policy: EvictionPolicy::Clock,
            pool_evictor: EvictorKind::FromLargest,
            sizeof_engine: SizeOfEngine::default(),
            default_ttl: 0,
            default_tti: 0,
            expiry_interval: 1,
            soak_seconds: 30,
            workers: 4,
        }
    }
}

/// Reads and parses `name`, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// == Store Config ==
/// Describes one store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    /// Requested segment count; see [`StoreConfig::segment_count`]
    pub segments: usize,
    /// Local entry cap (0 = unbounded)
    pub max_entries: u64,
    pub policy: EvictionPolicy,
    /// Default TTL in seconds (0 = none)
    pub ttl: u64,
    /// Default TTI in seconds (0 = none)
    pub tti: u64,
    pub eternal: bool,
    /// Pin the whole store in its tier: nothing is ever evicted
    pub pinned: bool,
    pub copy_on_read: bool,
    pub copy_on_write: bool,
    /// Overrides the pool's sizing engine for this store
    pub engine: Option<SizeOfEngine>,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments: 16,
            max_entries: 0,
            policy: EvictionPolicy::default(),
            ttl: 0,
            tti: 0,
            eternal: false,
            pinned: false,
            copy_on_read: false,
            copy_on_write: false,
            engine: None,
        }
    }

    pub fn segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = seconds;
        self
    }

    pub fn tti(mut self, seconds: u64) -> Self {
        self.tti = seconds;
        self
    }

    pub fn eternal(mut self, eternal: bool) -> Self {
        self.eternal = eternal;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn copy_on_read(mut self, copy: bool) -> Self {
        self.copy_on_read = copy;
        self
    }

    pub fn copy_on_write(mut self, copy: bool) -> Self {
        self.copy_on_write = copy;
        self
    }

    pub fn engine(mut self, engine: SizeOfEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Segment count rounded up to a power of two within `1..=256`.
    pub fn segment_count(&self) -> usize {
        self.segments.clamp(1, MAX_SEGMENTS).next_power_of_two()
    }

    pub fn expiry(&self) -> ExpirySettings {
        ExpirySettings {
            ttl: self.ttl,
            tti: self.tti,
            eternal: self.eternal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.heap_max_bytes, 64 * 1024 * 1024);
        assert_eq!(config.heap_max_entries, 10_000);
        assert_eq!(config.segments, 16);
        assert_eq!(config.eviction_policy, EvictionPolicy::Clock);
        assert_eq!(config.pool_evictor, EvictorKind::FromLargest);
        assert_eq!(config.expiry_interval, 1);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "HEAP_MAX_BYTES",
            "HEAP_MAX_ENTRIES",
            "DISK_MAX_BYTES",
            "SEGMENTS",
            "EVICTION_POLICY",
            "POOL_EVICTOR",
            "SIZEOF_ENGINE",
            "DEFAULT_TTL",
            "DEFAULT_TTI",
            "EXPIRY_INTERVAL",
            "SOAK_SECONDS",
            "WORKERS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        let defaults = Config::default();
        assert_eq!(config.heap_max_bytes, defaults.heap_max_bytes);
        assert_eq!(config.disk_max_bytes, defaults.disk_max_bytes);
        assert_eq!(config.eviction_policy, defaults.eviction_policy);
        assert_eq!(config.sizeof_engine, defaults.sizeof_engine);
        assert_eq!(config.workers, defaults.workers);
    }

    #[test]
    fn test_sizeof_engine_from_env() {
        assert_eq!(env_or("TIERED_CACHE_TEST_UNSET_ENGINE", SizeOfEngine::default()), SizeOfEngine::default());
        env::set_var("TIERED_CACHE_TEST_ENGINE", "unit");
        assert_eq!(
            env_or("TIERED_CACHE_TEST_ENGINE", SizeOfEngine::default()),
            SizeOfEngine::Unit
        );
        env::set_var("TIERED_CACHE_TEST_ENGINE", "bytes");
        assert_eq!(
            env_or("TIERED_CACHE_TEST_ENGINE", SizeOfEngine::Unit),
            SizeOfEngine::default()
        );
        env::remove_var("TIERED_CACHE_TEST_ENGINE");
    }

    #[test]
    fn test_env_or_parses_and_falls_back() {
        env::set_var("TIERED_CACHE_TEST_POLICY", "lfu");
        env::set_var("TIERED_CACHE_TEST_BAD", "not-a-number");
        assert_eq!(
            env_or("TIERED_CACHE_TEST_POLICY", EvictionPolicy::Clock),
            EvictionPolicy::Lfu
        );
        assert_eq!(env_or("TIERED_CACHE_TEST_BAD", 7u64), 7);
        env::remove_var("TIERED_CACHE_TEST_POLICY");
        env::remove_var("TIERED_CACHE_TEST_BAD");
    }

    #[test]
    fn test_segment_count_is_power_of_two() {
        assert_eq!(StoreConfig::new("s").segments(0).segment_count(), 1);
        assert_eq!(StoreConfig::new("s").segments(5).segment_count(), 8);
        assert_eq!(StoreConfig::new("s").segments(16).segment_count(), 16);
        assert_eq!(StoreConfig::new("s").segments(10_000).segment_count(), 256);
    }

    #[test]
    fn test_heap_store_inherits_defaults() {
        let config = Config {
            default_ttl: 60,
            heap_max_entries: 5,
            ..Config::default()
        };
        let store = config.heap_store("users");
        assert_eq!(store.name, "users");
        assert_eq!(store.max_entries, 5);
        assert_eq!(store.expiry().ttl, 60);
        assert_eq!(config.disk_store("users").max_entries, 0);
    }
}
