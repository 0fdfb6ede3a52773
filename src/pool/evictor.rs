//! Pool Evictor Module
//!
//! Chooses which participant of a pool gives up space when an admission
//! request would exceed the pool's budget.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::PoolParticipant;

// == Constants ==
/// Upper bound on entries a single participant is asked to evict per round
pub const MAX_EVICTION_BATCH: usize = 32;

// == Evictor Kind ==
/// Victim-participant selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictorKind {
    /// Largest consumer first; lower hit rate breaks ties
    #[default]
    FromLargest,
    /// Rotate through participants
    RoundRobin,
}

impl FromStr for EvictorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "largest" | "from_largest" => Ok(EvictorKind::FromLargest),
            "round_robin" | "roundrobin" => Ok(EvictorKind::RoundRobin),
            other => Err(format!("unknown pool evictor '{}'", other)),
        }
    }
}

// == Candidate ==
/// A live participant together with what it currently consumes.
pub(crate) struct Candidate {
    pub(crate) participant: Arc<dyn PoolParticipant>,
    pub(crate) consumed: u64,
}

// == Evictor ==
/// Cross-store eviction coordinator owned by a pool.
#[derive(Debug, Default)]
pub struct Evictor {
    kind: EvictorKind,
    cursor: AtomicUsize,
}

impl Evictor {
    pub fn new(kind: EvictorKind) -> Self {
        Self {
            kind,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> EvictorKind {
        self.kind
    }

    // == Free Space ==
    /// Runs one eviction round aiming to release `units`.
    ///
    /// Returns true if at least one participant evicted something. The pool
    /// re-checks its headroom and decides whether another round is needed.
    pub(crate) fn free_space(&self, mut candidates: Vec<Candidate>, units: u64) -> bool {
        candidates.retain(|c| c.consumed > 0);
        if candidates.is_empty() {
            return false;
        }

        match self.kind {
            EvictorKind::FromLargest => {
                candidates.sort_by(|a, b| {
                    b.consumed.cmp(&a.consumed).then_with(|| {
                        a.participant
                            .approximate_hit_rate()
                            .total_cmp(&b.participant.approximate_hit_rate())
                    })
                });
            }
            EvictorKind::RoundRobin => {
                let start = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                candidates.rotate_left(start);
            }
        }

        for candidate in &candidates {
            let count = entries_to_evict(candidate, units);
            if candidate.participant.evict(count, units) {
                debug!(
                    participant = candidate.participant.name(),
                    count, units, "pool evictor freed space"
                );
                return true;
            }
        }
        false
    }
}

/// Estimates how many entries of `candidate` cover `units`.
fn entries_to_evict(candidate: &Candidate, units: u64) -> usize {
    let count = candidate.participant.approximate_count().max(1);
    let average = (candidate.consumed / count).max(1);
    let needed = units.div_ceil(average) as usize;
    needed.clamp(1, MAX_EVICTION_BATCH)
}
