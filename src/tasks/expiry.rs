//! Expiry Task
//!
//! Background task that periodically removes expired entries from every
//! managed store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::ManagedStore;

/// Spawns a background task that sweeps expired entries.
///
/// Entries in flight to a faster tier are left alone; they expire when
/// flushed back. Sweeps take segment locks, so each one runs on the
/// blocking thread pool.
///
/// # Arguments
/// * `stores` - Stores to sweep
/// * `interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, to be aborted on shutdown.
pub fn spawn_expiry_task(stores: Vec<Arc<dyn ManagedStore>>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));
    let stores: Arc<[Arc<dyn ManagedStore>]> = stores.into();

    tokio::spawn(async move {
        info!(
            stores = stores.len(),
            "Starting expiry task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let sweep = Arc::clone(&stores);
            let removed = match tokio::task::spawn_blocking(move || {
                sweep.iter().map(|store| store.evict_expired()).sum::<usize>()
            })
            .await
            {
                Ok(removed) => removed,
                Err(err) => {
                    error!("Expiry sweep failed: {}", err);
                    continue;
                }
            };

            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
