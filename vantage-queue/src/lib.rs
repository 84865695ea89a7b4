//! Vantage Queue - Single-Flight Request Coordinator
//!
//! Deduplicates concurrent work by key, runs each operation once on a
//! detached driver, fans the outcome out to every waiter, and grants a fixed
//! number of concurrency slots by priority.

pub mod coordinator;
pub mod metrics;
pub mod task;

pub use coordinator::{RequestCoordinator, TaskHandle};
pub use metrics::{CoordinatorMetrics, CoordinatorMetricsSnapshot};
pub use task::{TaskState, TaskStatus, TaskToken};
