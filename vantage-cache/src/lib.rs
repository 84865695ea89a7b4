//! Vantage Cache - Namespaced TTL Cache
//!
//! In-memory cache partitioned into independent namespaces. Each namespace
//! has its own TTL, entry limit, byte limit, and counters. Entries expire
//! lazily on read and actively through the sweep task; capacity is kept by
//! evicting the least-recently-accessed entries.

pub mod entry;
pub mod manager;
pub mod namespace;
pub mod report;
pub mod sweep;

pub use entry::{estimate_size, TimedEntry, DEFAULT_ENTRY_SIZE_BYTES};
pub use manager::{CacheManager, SweepReport};
pub use namespace::{CacheNamespace, NamespaceMetrics, NamespaceStore};
pub use report::{
    assess_health, AggregateMetrics, CacheHealthReport, CacheMetricsReport, NamespaceReport,
    OverallMetrics, OverallReport,
};
pub use sweep::{cache_sweep_task, SweepMetrics, SweepSnapshot, MIN_SWEEP_INTERVAL};
