//! Tiered Cache - An in-process multi-tier caching engine
//!
//! Segmented concurrent stores share byte or entry budgets through pools,
//! evict under pressure with pluggable policies, honour pinning and stack
//! into a fast tier over an authoritative one.

pub mod config;
pub mod dynamic;
pub mod error;
pub mod manager;
pub mod pool;
pub mod store;
pub mod tasks;

pub use config::{Config, StoreConfig};
pub use dynamic::{ConfigurationListener, DynamicConfigBridge, DynamicTarget, LiveConfiguration};
pub use error::{CacheError, Result};
pub use manager::{CacheManager, TwoTierStore};
pub use pool::{EvictorKind, Pool, PoolAccessor, PoolParticipant, SizeOf, SizeOfEngine};
pub use store::{
    AuthoritativeTier, CloneCopier, Entry, EvictionListener, EvictionPolicy, Install, JsonCopier, ManagedStore,
    SegmentedStore, Store, StoreStats, TieredStore, ValueCopier,
};
pub use tasks::spawn_expiry_task;
