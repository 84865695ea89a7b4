//! Cache Sweep Background Task
//!
//! Lazy expiry only removes entries that are read again. This task removes
//! the rest: on every tick it purges expired entries from each namespace and
//! re-asserts capacity limits.
//!
//! # Usage
//!
//! ```ignore
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(cache_sweep_task(
//!     Arc::clone(&manager),
//!     Duration::from_secs(300),
//!     shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shortest interval the sweep task will tick at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

use crate::manager::CacheManager;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity since the task started.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Sweep cycles completed
    pub cycles: AtomicU64,

    /// Expired entries removed
    pub expired_removed: AtomicU64,

    /// Entries evicted to restore capacity limits
    pub evicted: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSnapshot {
    pub cycles: u64,
    pub expired_removed: u64,
    pub evicted: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep every namespace each `sweep_interval` until shutdown is signalled.
///
/// The first sweep runs one interval after start. Intervals shorter than
/// [`MIN_SWEEP_INTERVAL`] are raised to it. Returns the metrics collected
/// during the task's lifetime.
pub async fn cache_sweep_task(
    manager: Arc<CacheManager>,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    if sweep_interval < MIN_SWEEP_INTERVAL {
        tracing::warn!(
            requested_ms = sweep_interval.as_millis() as u64,
            "Sweep interval too short, using minimum"
        );
    }
    let sweep_interval = sweep_interval.max(MIN_SWEEP_INTERVAL);

    let mut ticker = interval_at(Instant::now() + sweep_interval, sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&manager, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        expired_removed = snapshot.expired_removed,
        evicted = snapshot.evicted,
        "Cache sweep task completed"
    );

    metrics
}

fn sweep_once(manager: &CacheManager, metrics: &SweepMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    let report = manager.run_sweep();

    metrics
        .expired_removed
        .fetch_add(report.expired as u64, Ordering::Relaxed);
    metrics
        .evicted
        .fetch_add(report.evicted as u64, Ordering::Relaxed);

    if report.expired > 0 || report.evicted > 0 {
        tracing::info!(
            expired = report.expired,
            evicted = report.evicted,
            duration_ms = report.duration.as_millis() as u64,
            "Cache sweep cycle completed"
        );
    } else {
        tracing::trace!("Cache sweep cycle completed with nothing to remove");
    }
}
