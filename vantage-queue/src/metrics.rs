//! Coordinator counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for coordinator activity since construction.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    /// New tasks created.
    pub admitted: AtomicU64,
    /// Callers attached to an existing task instead of creating one.
    pub joined: AtomicU64,
    /// Operations that ran to completion (including canceled-while-running).
    pub executed: AtomicU64,
    /// Outcomes published as success.
    pub succeeded: AtomicU64,
    /// Outcomes published as failure.
    pub failed: AtomicU64,
    pub canceled: AtomicU64,
    /// Admissions refused because the queue was full.
    pub rejected: AtomicU64,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters together with the current queue gauges.
    pub fn snapshot(&self, queued: usize, running: usize) -> CoordinatorMetricsSnapshot {
        CoordinatorMetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            queued,
            running,
        }
    }
}

/// Snapshot of coordinator metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMetricsSnapshot {
    pub admitted: u64,
    pub joined: u64,
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub canceled: u64,
    pub rejected: u64,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Slots currently held.
    pub running: usize,
}
