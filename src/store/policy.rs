//! Eviction Policy Module
//!
//! The closed set of victim-selection policies a segmented store can run.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;

use super::entry::Entry;

// == Eviction Policy ==
/// How a segment picks one victim among its evictable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Second-chance clock sweep over the segment's slots
    #[default]
    Clock,
    /// Least recently used among a sample
    Lru,
    /// Least frequently used among a sample
    Lfu,
    /// Oldest insertion among a sample
    Fifo,
}

impl EvictionPolicy {
    /// True for policies that compare a sample instead of sweeping.
    pub fn is_sampled(&self) -> bool {
        !matches!(self, EvictionPolicy::Clock)
    }

    /// Orders two candidates; `Less` means `a` is the better victim.
    ///
    /// Ties are broken by lowest hit count, then oldest creation time.
    pub fn compare<K, V>(&self, a: &Entry<K, V>, b: &Entry<K, V>) -> Ordering {
        let primary = match self {
            EvictionPolicy::Lru | EvictionPolicy::Clock => a.last_used().cmp(&b.last_used()),
            EvictionPolicy::Lfu => Ordering::Equal,
            EvictionPolicy::Fifo => a.created_at().cmp(&b.created_at()),
        };
        primary
            .then_with(|| a.hit_count().cmp(&b.hit_count()))
            .then_with(|| a.created_at().cmp(&b.created_at()))
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clock" => Ok(EvictionPolicy::Clock),
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}
