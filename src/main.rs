//! Tiered Cache soak runner
//!
//! Drives concurrent workers against a heap-over-disk tiered store for a
//! configured time, then logs statistics and shuts the manager down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::{spawn_expiry_task, CacheManager, CloneCopier, Config, Entry, Store, TwoTierStore};

/// Share of operations that are reads, in percent.
const READ_PERCENT: u64 = 70;
/// Share of operations that are removes, in percent.
const REMOVE_PERCENT: u64 = 5;

/// Main entry point for the soak run.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache manager and a tiered store
/// 4. Start the background expiry task
/// 5. Run workers until the soak time elapses or a shutdown signal arrives
/// 6. Log final statistics and shut the manager down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tiered Cache soak run");

    let config = Config::from_env();
    info!(
        "Configuration loaded: heap_max_bytes={}, heap_max_entries={}, disk_max_bytes={}, segments={}, policy={:?}, workers={}, soak={}s",
        config.heap_max_bytes,
        config.heap_max_entries,
        config.disk_max_bytes,
        config.segments,
        config.eviction_policy,
        config.workers,
        config.soak_seconds
    );

    let manager = CacheManager::new(&config);
    let store: Arc<TwoTierStore<u64, String>> = manager.create_tiered(
        &config.heap_store("soak").copy_on_read(true),
        &config.disk_store("soak-disk"),
        Some(Arc::new(CloneCopier)),
    )?;
    info!("Tiered store initialized");

    let expiry_handle = spawn_expiry_task(manager.managed_stores(), config.expiry_interval);
    info!("Background expiry task started");

    let stop = Arc::new(AtomicBool::new(false));
    let operations = Arc::new(AtomicU64::new(0));
    let key_space = config.heap_max_entries.max(1) * 4;
    let workers: Vec<_> = (0..config.workers.max(1))
        .map(|id| {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            let operations = Arc::clone(&operations);
            tokio::task::spawn_blocking(move || run_worker(id as u64, &store, key_space, &stop, &operations))
        })
        .collect();

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = tokio::time::sleep(Duration::from_secs(config.soak_seconds)) => {
            info!("Soak time elapsed");
        }
    }

    stop.store(true, Ordering::Release);
    for worker in workers {
        if let Err(err) = worker.await {
            error!(%err, "worker panicked");
        }
    }
    expiry_handle.abort();
    warn!("Expiry task aborted");

    info!(operations = operations.load(Ordering::Relaxed), "Soak run finished");
    for stats in manager.stats() {
        info!("{}", serde_json::to_string(&stats)?);
    }
    info!("{}", serde_json::to_string(&store.cache().stats())?);

    manager.shutdown();
    info!("Shutdown complete");
    Ok(())
}

/// Mixed read/write/remove workload over a fixed key space.
fn run_worker(id: u64, store: &TwoTierStore<u64, String>, key_space: u64, stop: &AtomicBool, operations: &AtomicU64) {
    let mut seed = id.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut done = 0u64;

    while !stop.load(Ordering::Acquire) {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        let key = (seed >> 33) % key_space;
        let roll = (seed >> 17) % 100;

        if roll < READ_PERCENT {
            store.get(&key);
        } else if roll < READ_PERCENT + REMOVE_PERCENT {
            if let Err(err) = store.remove(&key) {
                warn!(worker = id, key, %err, "remove failed");
            }
        } else if let Err(err) = store.put(Entry::new(key, format!("value-{}-{}", key, done))) {
            if !err.is_recoverable() {
                error!(worker = id, key, %err, "put failed");
            }
        }
        done += 1;
    }
    operations.fetch_add(done, Ordering::Relaxed);
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
