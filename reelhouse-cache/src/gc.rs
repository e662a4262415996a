//! Background garbage collection of idle cache entries.

use crate::query_cache::QueryCache;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Default interval between collection passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the garbage collection task.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// How often to look for idle entries (default: 60 seconds)
    pub interval: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_GC_INTERVAL,
        }
    }
}

impl GcConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Spawn a task that runs [`QueryCache::collect_garbage`] on an interval.
///
/// The task stops when `shutdown_rx` observes `true` or its sender is
/// dropped. It returns the total number of evicted entries.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = spawn_gc_task(cache.clone(), GcConfig::default(), shutdown_rx);
///
/// // Later
/// let _ = shutdown_tx.send(true);
/// let evicted = handle.await?;
/// ```
pub fn spawn_gc_task(
    cache: QueryCache,
    config: GcConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut evicted_total = 0u64;

        tracing::info!(interval_ms = config.interval.as_millis() as u64, "Cache GC task started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Cache GC task shutting down");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match cache.collect_garbage() {
                        Ok(0) => tracing::trace!("Cache GC pass evicted nothing"),
                        Ok(evicted) => evicted_total += evicted as u64,
                        Err(e) => tracing::error!(error = %e, "Cache GC pass failed"),
                    }
                }
            }
        }

        tracing::info!(evicted_total, "Cache GC task completed");
        evicted_total
    })
}
