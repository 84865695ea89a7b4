//! Integration tests for the request coordinator.
//!
//! Operations are gated on a semaphore so each test controls exactly when
//! the work finishes, and counts its invocations so single execution can be
//! asserted directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use vantage_core::{CoordinatorConfig, CoordinatorError, VantageError, VantageResult};
use vantage_queue::{RequestCoordinator, TaskState, TaskToken};

// ============================================================================
// HELPERS
// ============================================================================

type OpFuture = Pin<Box<dyn Future<Output = VantageResult<u32>> + Send>>;

/// Operation that waits for one gate permit, counts the call, returns `value`.
fn gated_op(
    gate: &Arc<Semaphore>,
    calls: &Arc<AtomicUsize>,
    value: u32,
) -> impl FnOnce() -> OpFuture + Send + 'static {
    let gate = Arc::clone(gate);
    let calls = Arc::clone(calls);
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| VantageError::collaborator(e.to_string()))?;
            Ok(value)
        })
    }
}

/// Operation that records its name when it starts.
fn recording_op(
    log: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
) -> impl FnOnce() -> OpFuture + Send + 'static {
    let log = Arc::clone(log);
    move || {
        Box::pin(async move {
            log.lock().expect("log lock").push(name);
            Ok(0)
        })
    }
}

fn coordinator(slots: usize) -> RequestCoordinator {
    RequestCoordinator::new(CoordinatorConfig::new().with_max_concurrent(slots))
        .expect("valid config")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

fn explode() -> u32 {
    panic!("scraper exploded")
}

fn is_canceled(err: &VantageError) -> bool {
    matches!(err, VantageError::Coordinator(CoordinatorError::Canceled { .. }))
}

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_execution() {
    let coordinator = coordinator(4);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "scrape:https://acme.test";

    let callers: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = coordinator.clone();
            let op = gated_op(&gate, &calls, 42);
            tokio::spawn(async move { coordinator.run(key, 0, op).await })
        })
        .collect();

    eventually(|| coordinator.status(key).map(|s| s.waiters) == Some(16)).await;
    gate.add_permits(1);

    for caller in callers {
        assert_eq!(caller.await.expect("caller joined").expect("value"), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let metrics = coordinator.metrics();
    assert_eq!(metrics.admitted, 1);
    assert_eq!(metrics.joined, 15);
    assert_eq!(metrics.executed, 1);
}

#[tokio::test]
async fn test_errors_fan_out_and_are_not_cached() {
    let coordinator = RequestCoordinator::new(
        CoordinatorConfig::new().with_completed_grace(Duration::ZERO),
    )
    .expect("valid config");
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(VantageError::collaborator("upstream down"))
        }
    };

    let first = coordinator
        .submit("analyze:https://acme.test", 0, failing(Arc::clone(&calls)))
        .expect("admitted");
    let second = coordinator
        .submit("analyze:https://acme.test", 0, failing(Arc::clone(&calls)))
        .expect("joined");
    assert!(second.is_joined());

    let (a, b) = (first.wait().await, second.wait().await);
    assert_eq!(a.unwrap_err(), VantageError::collaborator("upstream down"));
    assert_eq!(b.unwrap_err(), VantageError::collaborator("upstream down"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // No grace window: the next caller executes again.
    let third = coordinator
        .run("analyze:https://acme.test", 0, failing(Arc::clone(&calls)))
        .await;
    assert!(third.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.metrics().failed, 2);
}

#[tokio::test]
async fn test_failed_task_is_not_joinable_within_grace_window() {
    // Default config keeps successes joinable for a while; failures must not be.
    let coordinator = RequestCoordinator::default();
    assert!(!coordinator.config().completed_grace.is_zero());
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "scrape:https://acme.test";

    let flaky = |calls: Arc<AtomicUsize>| {
        move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(VantageError::collaborator("transient"))
            } else {
                Ok(11u32)
            }
        }
    };

    let first = coordinator.run(key, 0, flaky(Arc::clone(&calls))).await;
    assert_eq!(first.unwrap_err(), VantageError::collaborator("transient"));
    assert!(coordinator.status(key).is_none());

    let retry: u32 = coordinator
        .run(key, 0, flaky(Arc::clone(&calls)))
        .await
        .expect("retry runs again");
    assert_eq!(retry, 11);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        coordinator.status(key).map(|s| s.state),
        Some(TaskState::Succeeded)
    );
}

#[tokio::test]
async fn test_late_joiner_within_grace_window_reuses_outcome() {
    let coordinator = RequestCoordinator::new(
        CoordinatorConfig::new().with_completed_grace(Duration::from_secs(30)),
    )
    .expect("valid config");
    let gate = Arc::new(Semaphore::new(10));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "scrape:https://acme.test";

    let first: u32 = coordinator
        .run(key, 0, gated_op(&gate, &calls, 1))
        .await
        .expect("value");
    let late: u32 = coordinator
        .run(key, 0, gated_op(&gate, &calls, 2))
        .await
        .expect("value");

    assert_eq!((first, late), (1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        coordinator.status(key).map(|s| s.state),
        Some(TaskState::Succeeded)
    );

    assert!(coordinator.forget(key));
    let fresh: u32 = coordinator
        .run(key, 0, gated_op(&gate, &calls, 3))
        .await
        .expect("value");
    assert_eq!(fresh, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_completed_task_leaves_table_after_grace() {
    let coordinator = RequestCoordinator::new(
        CoordinatorConfig::new().with_completed_grace(Duration::from_secs(2)),
    )
    .expect("valid config");
    let key = "scrape:https://acme.test";

    let _: u32 = coordinator
        .run(key, 0, || async { Ok(5) })
        .await
        .expect("value");
    assert!(coordinator.status(key).is_some());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(coordinator.status(key).is_none());
}

// ============================================================================
// PRIORITY ADMISSION
// ============================================================================

#[tokio::test]
async fn test_higher_priority_is_granted_the_next_slot() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let blocker = coordinator
        .submit("blocker", 0, gated_op(&gate, &calls, 0))
        .expect("admitted");
    let a = coordinator.submit("a", 1, recording_op(&log, "A")).expect("a");
    let b = coordinator.submit("b", 5, recording_op(&log, "B")).expect("b");
    let c = coordinator.submit("c", 1, recording_op(&log, "C")).expect("c");

    assert_eq!(coordinator.status("a").map(|s| s.state), Some(TaskState::Queued));
    assert_eq!(coordinator.metrics().queued, 3);

    gate.add_permits(1);
    blocker.wait().await.expect("blocker");
    for handle in [a, b, c] {
        handle.wait().await.expect("value");
    }

    assert_eq!(*log.lock().expect("log lock"), vec!["B", "A", "C"]);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let coordinator = coordinator(2);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..5u32)
        .map(|i| {
            coordinator
                .submit(format!("scrape:https://acme.test/{i}"), 0, gated_op(&gate, &calls, i))
                .expect("admitted")
        })
        .collect();

    let metrics = coordinator.metrics();
    assert_eq!(metrics.running, 2);
    assert_eq!(metrics.queued, 3);

    gate.add_permits(5);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().await.expect("value"), i as u32);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(coordinator.metrics().running, 0);
}

// ============================================================================
// CANCELLATION AND TIMEOUTS
// ============================================================================

#[tokio::test]
async fn test_cancel_queued_task_never_runs() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let blocker_calls = Arc::new(AtomicUsize::new(0));
    let queued_calls = Arc::new(AtomicUsize::new(0));

    let blocker = coordinator
        .submit("blocker", 0, gated_op(&gate, &blocker_calls, 0))
        .expect("admitted");
    let queued = coordinator
        .submit("queued", 0, gated_op(&gate, &queued_calls, 1))
        .expect("admitted");

    assert!(coordinator.cancel("queued"));
    assert!(!coordinator.cancel("queued"));
    assert!(is_canceled(&queued.wait().await.unwrap_err()));
    assert!(coordinator.status("queued").is_none());

    gate.add_permits(2);
    blocker.wait().await.expect("blocker");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(queued_calls.load(Ordering::SeqCst), 0);
    let metrics = coordinator.metrics();
    assert_eq!(metrics.canceled, 1);
    assert_eq!(metrics.queued, 0);
    assert_eq!(metrics.executed, 1);
}

#[tokio::test]
async fn test_cancel_running_task_releases_waiters_but_holds_slot() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "analyze:https://acme.test";

    let running = coordinator
        .submit(key, 0, gated_op(&gate, &calls, 1))
        .expect("admitted");
    assert_eq!(coordinator.status(key).map(|s| s.state), Some(TaskState::Running));

    assert!(coordinator.cancel(key));
    assert!(is_canceled(&running.wait().await.unwrap_err()));
    assert!(coordinator.status(key).is_none());

    // The slot is still held by the canceled operation.
    let fresh = coordinator
        .submit(key, 0, gated_op(&gate, &calls, 2))
        .expect("admitted");
    assert!(!fresh.is_joined());
    assert_eq!(coordinator.status(key).map(|s| s.state), Some(TaskState::Queued));
    assert_eq!(coordinator.metrics().running, 1);

    gate.add_permits(2);
    assert_eq!(fresh.wait().await.expect("value"), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.metrics().running, 0);
}

#[tokio::test]
async fn test_cancel_marks_running_token() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let (seen_tx, seen_rx) = oneshot::channel();
    let key = "scrape:https://acme.test";

    let handle = coordinator
        .submit_with_token(key, 0, {
            let gate = Arc::clone(&gate);
            move |token: TaskToken| async move {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| VantageError::collaborator(e.to_string()))?;
                let _ = seen_tx.send(token.is_canceled());
                Ok::<_, VantageError>(1u32)
            }
        })
        .expect("admitted");

    assert!(coordinator.cancel(key));
    assert!(is_canceled(&handle.wait().await.unwrap_err()));

    gate.add_permits(1);
    assert!(seen_rx.await.expect("operation finished"));
}

#[tokio::test]
async fn test_uncanceled_token_stays_clear() {
    let coordinator = coordinator(1);
    let value = coordinator
        .submit_with_token("k", 0, |token: TaskToken| async move {
            Ok::<_, VantageError>(token.is_canceled())
        })
        .expect("admitted")
        .wait()
        .await
        .expect("value");
    assert!(!value);
}

#[tokio::test]
async fn test_timeout_abandons_wait_without_canceling() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "scrape:https://slow.test";

    let err = coordinator
        .run_with_timeout(key, 0, Duration::from_millis(30), gated_op(&gate, &calls, 9))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(coordinator.status(key).map(|s| s.state), Some(TaskState::Running));

    let joiner = coordinator
        .submit(key, 0, gated_op(&gate, &calls, 0))
        .expect("joined");
    assert!(joiner.is_joined());

    gate.add_permits(1);
    assert_eq!(joiner.wait().await.expect("value"), 9);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_caller_does_not_stop_the_task() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = "scrape:https://acme.test";

    let admitting = {
        let coordinator = coordinator.clone();
        let op = gated_op(&gate, &calls, 7);
        tokio::spawn(async move { coordinator.run(key, 0, op).await })
    };
    eventually(|| coordinator.is_in_flight(key)).await;
    admitting.abort();

    let joiner = coordinator
        .submit(key, 0, gated_op(&gate, &calls, 0))
        .expect("joined");
    gate.add_permits(1);
    assert_eq!(joiner.wait().await.expect("value"), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// FAILURE MODES
// ============================================================================

#[tokio::test]
async fn test_panic_is_delivered_to_every_waiter() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let key = "analyze:https://acme.test";

    let op = {
        let gate = Arc::clone(&gate);
        move || async move {
            let _permit = gate.acquire().await;
            Ok(explode())
        }
    };

    let handles: Vec<_> = std::iter::once(coordinator.submit(key, 0, op).expect("admitted"))
        .chain((0..2).map(|_| {
            coordinator
                .submit(key, 0, || async { Ok(1u32) })
                .expect("joined")
        }))
        .collect();

    gate.add_permits(1);
    for handle in handles {
        match handle.wait().await.unwrap_err() {
            VantageError::Coordinator(CoordinatorError::TaskPanicked { reason, .. }) => {
                assert!(reason.contains("scraper exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // The panicking task released its slot.
    let next: u32 = coordinator
        .run("other", 0, || async { Ok(3) })
        .await
        .expect("value");
    assert_eq!(next, 3);
}

#[tokio::test]
async fn test_queue_depth_limit_rejects_new_keys_only() {
    let coordinator = RequestCoordinator::new(
        CoordinatorConfig::new()
            .with_max_concurrent(1)
            .with_max_queue_depth(Some(1)),
    )
    .expect("valid config");
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let running = coordinator
        .submit("running", 0, gated_op(&gate, &calls, 0))
        .expect("admitted");
    let queued = coordinator
        .submit("queued", 0, gated_op(&gate, &calls, 1))
        .expect("queued");

    let err = coordinator
        .submit("rejected", 0, gated_op(&gate, &calls, 2))
        .unwrap_err();
    assert!(matches!(
        err,
        VantageError::Coordinator(CoordinatorError::CapacityExceeded { limit: 1, .. })
    ));

    let joiner = coordinator
        .submit("queued", 0, gated_op(&gate, &calls, 3))
        .expect("joining is never rejected");
    assert!(joiner.is_joined());
    assert_eq!(coordinator.metrics().rejected, 1);

    gate.add_permits(3);
    running.wait().await.expect("running");
    assert_eq!(queued.wait().await.expect("queued"), 1);
    assert_eq!(joiner.wait().await.expect("joiner"), 1);
}

#[tokio::test]
async fn test_status_reports_lifecycle_fields() {
    let coordinator = coordinator(1);
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let running = coordinator
        .submit("running", 2, gated_op(&gate, &calls, 0))
        .expect("admitted");
    let queued = coordinator
        .submit("queued", 7, gated_op(&gate, &calls, 0))
        .expect("admitted");

    let running_status = coordinator.status("running").expect("status");
    assert_eq!(running_status.priority, 2);
    assert_eq!(running_status.waiters, 1);
    assert!(running_status.started_at.is_some());
    assert!(running_status.completed_at.is_none());
    assert_eq!(running_status.task_id, running.task_id());

    let queued_status = coordinator.status("queued").expect("status");
    assert_eq!(queued_status.state, TaskState::Queued);
    assert!(queued_status.started_at.is_none());

    gate.add_permits(2);
    running.wait().await.expect("running");
    queued.wait().await.expect("queued");

    let done = coordinator.status("queued").expect("within grace");
    assert_eq!(done.state, TaskState::Succeeded);
    assert!(done.completed_at.is_some());
    assert_eq!(done.waiters, 0);
}
