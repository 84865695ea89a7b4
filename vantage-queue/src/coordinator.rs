//! Single-flight request coordinator.
//!
//! Every operation is identified by a dedup key. The first caller for a key
//! creates a task; callers arriving while that task is queued or running (or
//! succeeded within the grace window) attach to it and receive the same
//! outcome. Failed tasks leave the table as soon as their outcome is
//! published, so the next caller runs the operation again. A fixed pool of slots bounds how many tasks run at once; queued
//! tasks are granted slots by priority, FIFO among equal priorities.
//!
//! Execution is detached from the callers. Each task gets a driver on the
//! runtime that waits for its slot, runs the operation, and publishes the
//! outcome on a `watch` channel. Callers only ever wait on that channel, so a
//! caller that times out or is dropped never stops the work for the others.

use chrono::Utc;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinError;
use uuid::Uuid;
use vantage_core::{
    new_id, ConfigError, CoordinatorConfig, CoordinatorError, Timestamp, VantageError,
    VantageResult,
};

use crate::metrics::{CoordinatorMetrics, CoordinatorMetricsSnapshot};
use crate::task::{TaskState, TaskStatus, TaskToken};

/// Type-erased task outcome shared by every waiter.
type Outcome = Result<Arc<dyn Any + Send + Sync>, VantageError>;

// ============================================================================
// TASK TABLE
// ============================================================================

struct TaskEntry {
    id: Uuid,
    state: TaskState,
    priority: i32,
    queued_at: Timestamp,
    started_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
    outcome: watch::Sender<Option<Outcome>>,
    token: TaskToken,
    /// Slot grant for the driver; taken when the task starts.
    start: Option<oneshot::Sender<()>>,
}

impl TaskEntry {
    fn status(&self, key: &str) -> TaskStatus {
        TaskStatus {
            task_id: self.id,
            key: key.to_string(),
            state: self.state,
            priority: self.priority,
            waiters: self.outcome.receiver_count(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Queue position: higher priority first, then lower sequence number.
struct Ticket {
    priority: i32,
    seq: u64,
    key: String,
    id: Uuid,
}

impl PartialEq for Ticket {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Ticket {}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskEntry>,
    /// May hold stale tickets for canceled tasks; skipped on dispatch.
    queue: BinaryHeap<Ticket>,
    queued: usize,
    running: usize,
    seq: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

struct Shared {
    config: CoordinatorConfig,
    inner: Mutex<Inner>,
    metrics: CoordinatorMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grant free slots to the best queued tasks.
    fn dispatch(&self, inner: &mut Inner) {
        while inner.running < self.config.max_concurrent {
            let Some(ticket) = inner.queue.pop() else {
                break;
            };
            let Some(entry) = inner.tasks.get_mut(&ticket.key) else {
                continue;
            };
            if entry.id != ticket.id || entry.state != TaskState::Queued {
                continue;
            }
            let Some(start) = entry.start.take() else {
                continue;
            };

            entry.state = TaskState::Running;
            entry.started_at = Some(Utc::now());
            inner.queued = inner.queued.saturating_sub(1);

            if start.send(()).is_err() {
                tracing::warn!(key = %ticket.key, task_id = %ticket.id, "Task driver is gone, dropping task");
                if let Some(entry) = inner.tasks.remove(&ticket.key) {
                    entry.outcome.send_replace(Some(Err(canceled(&ticket.key))));
                }
                continue;
            }

            inner.running += 1;
            tracing::debug!(
                key = %ticket.key,
                task_id = %ticket.id,
                priority = ticket.priority,
                running = inner.running,
                "Task started"
            );
        }
    }

    /// Publish an operation's outcome and free its slot.
    fn complete(self: &Arc<Self>, key: &str, id: Uuid, outcome: Outcome, elapsed: Duration) {
        let grace = self.config.completed_grace;
        let mut inner = self.lock();
        inner.running = inner.running.saturating_sub(1);
        CoordinatorMetrics::incr(&self.metrics.executed);

        let succeeded = outcome.is_ok();
        let published = match inner.tasks.get_mut(key) {
            Some(entry) if entry.id == id => {
                entry.state = if succeeded {
                    TaskState::Succeeded
                } else {
                    TaskState::Failed
                };
                entry.completed_at = Some(Utc::now());
                let waiters = entry.outcome.receiver_count();
                entry.outcome.send_replace(Some(outcome));

                if succeeded {
                    CoordinatorMetrics::incr(&self.metrics.succeeded);
                } else {
                    CoordinatorMetrics::incr(&self.metrics.failed);
                }
                tracing::info!(
                    key,
                    task_id = %id,
                    succeeded,
                    waiters,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );
                true
            }
            _ => {
                tracing::debug!(key, task_id = %id, "Discarded outcome of canceled task");
                false
            }
        };

        // Only successes stay joinable; errors are never reused.
        let linger = published && succeeded && !grace.is_zero();
        if published && !linger {
            inner.tasks.remove(key);
        }

        self.dispatch(&mut inner);
        drop(inner);

        if linger {
            let shared = Arc::clone(self);
            let key = key.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                shared.expire(&key, id);
            });
        }
    }

    /// Drop a completed task once its grace window has passed.
    fn expire(&self, key: &str, id: Uuid) {
        let mut inner = self.lock();
        let done = inner
            .tasks
            .get(key)
            .is_some_and(|entry| entry.id == id && entry.state.is_terminal());
        if done {
            inner.tasks.remove(key);
            tracing::trace!(key, task_id = %id, "Completed task expired");
        }
    }
}

fn canceled(key: &str) -> VantageError {
    CoordinatorError::Canceled {
        key: key.to_string(),
    }
    .into()
}

fn panic_reason(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(_) => "task was aborted".to_string(),
    }
}

/// Wait for the slot, run the operation once, publish the outcome.
async fn drive<T, F, Fut>(
    shared: Arc<Shared>,
    key: String,
    id: Uuid,
    start: oneshot::Receiver<()>,
    token: TaskToken,
    operation: F,
) where
    T: Send + Sync + 'static,
    F: FnOnce(TaskToken) -> Fut + Send + 'static,
    Fut: Future<Output = VantageResult<T>> + Send + 'static,
{
    if start.await.is_err() {
        tracing::debug!(key = %key, task_id = %id, "Task canceled before it started");
        return;
    }

    let started = Instant::now();
    // Run on its own task so a panic surfaces as a JoinError.
    let joined = tokio::spawn(async move { operation(token).await }).await;
    let outcome: Outcome = match joined {
        Ok(Ok(value)) => Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
        Ok(Err(e)) => Err(e),
        Err(e) => {
            let reason = panic_reason(e);
            tracing::error!(key = %key, task_id = %id, reason = %reason, "Task panicked");
            Err(CoordinatorError::TaskPanicked {
                key: key.clone(),
                reason,
            }
            .into())
        }
    };

    shared.complete(&key, id, outcome, started.elapsed());
}

async fn wait_outcome(mut rx: watch::Receiver<Option<Outcome>>, key: &str) -> Outcome {
    match rx.wait_for(Option::is_some).await {
        Ok(current) => (*current).clone().unwrap_or_else(|| Err(canceled(key))),
        // Sender dropped without an outcome.
        Err(_) => Err(canceled(key)),
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// A caller's subscription to one task's outcome.
pub struct TaskHandle<T> {
    key: String,
    task_id: Uuid,
    joined: bool,
    rx: watch::Receiver<Option<Outcome>>,
    _value: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("key", &self.key)
            .field("task_id", &self.task_id)
            .field("joined", &self.joined)
            .finish()
    }
}

impl<T: Clone + 'static> TaskHandle<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// True if this caller attached to an existing task.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Wait for the task's outcome.
    pub async fn wait(self) -> VantageResult<T> {
        let value = wait_outcome(self.rx, &self.key).await?;
        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            CoordinatorError::TypeMismatch {
                key: self.key.clone(),
            }
            .into()
        })
    }

    /// Wait at most `wait` for the outcome. Giving up does not cancel the task.
    pub async fn wait_timeout(self, wait: Duration) -> VantageResult<T> {
        let key = self.key.clone();
        match tokio::time::timeout(wait, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(key = %key, waited_ms = wait.as_millis() as u64, "Gave up waiting for task");
                Err(CoordinatorError::Timeout { key, waited: wait }.into())
            }
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Deduplicates concurrent operations by key and bounds how many run at once.
///
/// Cheap to clone; clones share the same task table and slot pool.
#[derive(Clone)]
pub struct RequestCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("config", &self.shared.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::from_valid(CoordinatorConfig::default())
    }
}

impl RequestCoordinator {
    /// Create a coordinator.
    pub fn new(config: CoordinatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: CoordinatorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner::default()),
                metrics: CoordinatorMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.shared.config
    }

    /// Run `operation` under `key`, or join the task already doing so.
    pub async fn run<T, F, Fut>(
        &self,
        key: impl Into<String>,
        priority: i32,
        operation: F,
    ) -> VantageResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VantageResult<T>> + Send + 'static,
    {
        self.submit(key, priority, operation)?.wait().await
    }

    /// Like [`run`](Self::run), but give up waiting after `wait`.
    ///
    /// A timeout only abandons this caller's wait; the task keeps running for
    /// any other waiters and still completes.
    pub async fn run_with_timeout<T, F, Fut>(
        &self,
        key: impl Into<String>,
        priority: i32,
        wait: Duration,
        operation: F,
    ) -> VantageResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VantageResult<T>> + Send + 'static,
    {
        self.submit(key, priority, operation)?
            .wait_timeout(wait)
            .await
    }

    /// Admit (or join) a task without waiting for it.
    ///
    /// Must be called from within a Tokio runtime. `operation` is dropped
    /// unused when the caller joins an existing task.
    pub fn submit<T, F, Fut>(
        &self,
        key: impl Into<String>,
        priority: i32,
        operation: F,
    ) -> VantageResult<TaskHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = VantageResult<T>> + Send + 'static,
    {
        self.submit_with_token(key, priority, move |_token| operation())
    }

    /// Like [`submit`](Self::submit), but the operation receives the task's
    /// [`TaskToken`] and can see whether it has been canceled.
    pub fn submit_with_token<T, F, Fut>(
        &self,
        key: impl Into<String>,
        priority: i32,
        operation: F,
    ) -> VantageResult<TaskHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(TaskToken) -> Fut + Send + 'static,
        Fut: Future<Output = VantageResult<T>> + Send + 'static,
    {
        let key = key.into();
        let shared = &self.shared;
        let mut inner = shared.lock();

        if let Some(entry) = inner.tasks.get(&key) {
            CoordinatorMetrics::incr(&shared.metrics.joined);
            tracing::debug!(key = %key, task_id = %entry.id, state = ?entry.state, "Joined existing task");
            let (id, rx) = (entry.id, entry.outcome.subscribe());
            return Ok(TaskHandle {
                key,
                task_id: id,
                joined: true,
                rx,
                _value: PhantomData,
            });
        }

        if let Some(limit) = shared.config.max_queue_depth {
            if inner.queued >= limit {
                CoordinatorMetrics::incr(&shared.metrics.rejected);
                tracing::warn!(key = %key, limit, "Admission queue full, rejecting task");
                return Err(CoordinatorError::CapacityExceeded { key, limit }.into());
            }
        }

        let id = new_id();
        let seq = inner.next_seq();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (start_tx, start_rx) = oneshot::channel();
        let token = TaskToken::new();

        inner.tasks.insert(
            key.clone(),
            TaskEntry {
                id,
                state: TaskState::Queued,
                priority,
                queued_at: Utc::now(),
                started_at: None,
                completed_at: None,
                outcome: outcome_tx,
                token: token.clone(),
                start: Some(start_tx),
            },
        );
        inner.queue.push(Ticket {
            priority,
            seq,
            key: key.clone(),
            id,
        });
        inner.queued += 1;
        CoordinatorMetrics::incr(&shared.metrics.admitted);
        tracing::debug!(key = %key, task_id = %id, priority, queued = inner.queued, "Admitted task");

        tokio::spawn(drive(
            Arc::clone(shared),
            key.clone(),
            id,
            start_rx,
            token,
            operation,
        ));
        shared.dispatch(&mut inner);
        drop(inner);

        Ok(TaskHandle {
            key,
            task_id: id,
            joined: false,
            rx: outcome_rx,
            _value: PhantomData,
        })
    }

    /// Status of the task for `key`, if one is live or succeeded within its
    /// grace window.
    pub fn status(&self, key: &str) -> Option<TaskStatus> {
        self.shared
            .lock()
            .tasks
            .get(key)
            .map(|entry| entry.status(key))
    }

    /// True if a task for `key` is queued or running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.status(key).is_some_and(|status| status.state.is_live())
    }

    /// Cancel the live task for `key`. Returns false if there is none.
    ///
    /// A queued task is removed and never runs. A running task cannot be
    /// stopped: its waiters are released with `Canceled` at once, its token
    /// is marked canceled, its eventual outcome is discarded, and its slot
    /// stays held until it returns.
    pub fn cancel(&self, key: &str) -> bool {
        let mut inner = self.shared.lock();
        let live = inner
            .tasks
            .get(key)
            .is_some_and(|entry| entry.state.is_live());
        if !live {
            return false;
        }
        let Some(entry) = inner.tasks.remove(key) else {
            return false;
        };

        if entry.state == TaskState::Queued {
            inner.queued = inner.queued.saturating_sub(1);
        }
        entry.token.cancel();
        let waiters = entry.outcome.receiver_count();
        entry.outcome.send_replace(Some(Err(canceled(key))));
        CoordinatorMetrics::incr(&self.shared.metrics.canceled);
        tracing::info!(key, task_id = %entry.id, state = ?entry.state, waiters, "Task canceled");
        true
    }

    /// Drop a succeeded task still inside its grace window so the next
    /// caller starts a fresh execution. Live tasks are left alone.
    pub fn forget(&self, key: &str) -> bool {
        let mut inner = self.shared.lock();
        let done = inner
            .tasks
            .get(key)
            .is_some_and(|entry| entry.state.is_terminal());
        if done {
            inner.tasks.remove(key);
        }
        done
    }

    /// Counters plus current queue gauges.
    pub fn metrics(&self) -> CoordinatorMetricsSnapshot {
        let (queued, running) = {
            let inner = self.shared.lock();
            (inner.queued, inner.running)
        };
        self.shared.metrics.snapshot(queued, running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_order_priority_then_fifo() {
        let ticket = |priority, seq| Ticket {
            priority,
            seq,
            key: format!("k{seq}"),
            id: Uuid::nil(),
        };
        let mut heap = BinaryHeap::new();
        heap.push(ticket(1, 1));
        heap.push(ticket(5, 2));
        heap.push(ticket(1, 3));
        heap.push(ticket(5, 4));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|t| t.seq)).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = CoordinatorConfig::new().with_max_concurrent(0);
        assert!(RequestCoordinator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_returns_value() {
        let coordinator = RequestCoordinator::default();
        let value: u32 = coordinator
            .run("scrape:https://acme.test", 0, || async { Ok(7) })
            .await
            .expect("value");
        assert_eq!(value, 7);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.admitted, 1);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.running, 0);
    }

    #[tokio::test]
    async fn test_type_mismatch_on_shared_key() {
        let coordinator = RequestCoordinator::default();
        let _: u32 = coordinator
            .run("k", 0, || async { Ok(1u32) })
            .await
            .expect("value");

        // Still inside the grace window, so this joins the completed u32 task.
        let err = coordinator
            .run("k", 0, || async { Ok::<_, VantageError>("x".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VantageError::Coordinator(CoordinatorError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_reason_extracts_message() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(panic_reason(err), "boom");
    }
}
