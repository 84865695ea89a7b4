//! Task lifecycle types.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use vantage_core::Timestamp;

/// Lifecycle state of a coordinated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for a concurrency slot.
    Queued,
    /// Holding a slot; the operation is executing.
    Running,
    /// Finished with a value.
    Succeeded,
    /// Finished with an error (including a caught panic).
    Failed,
}

impl TaskState {
    /// Queued or Running. At most one live task exists per key.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Succeeded or Failed.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub key: String,
    pub state: TaskState,
    pub priority: i32,
    /// Callers currently waiting on the outcome.
    pub waiters: usize,
    pub queued_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Cancellation flag handed to a running operation.
///
/// Set when the task is canceled. The operation keeps running, but its
/// outcome will be discarded, so side effects it has not yet made (cache
/// writes, for instance) should be skipped.
#[derive(Debug, Clone, Default)]
pub struct TaskToken {
    canceled: Arc<AtomicBool>,
}

impl TaskToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}
