//! Cache manager owning every namespace.
//!
//! The manager is an ordinary value built by the composition root and shared
//! through an `Arc`; there is no process-global cache. Namespaces are created
//! lazily on first use with their configured limits and are independent of one
//! another: each has its own lock, counters, and eviction.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use vantage_core::{
    CacheError, CacheKey, CacheManagerConfig, ConfigError, NamespaceConfig, Timestamp,
    VantageResult,
};

use crate::namespace::{CacheNamespace, NamespaceMetrics, NamespaceStore};
use crate::report::{assess_health, AggregateMetrics, CacheHealthReport, CacheMetricsReport};

type NamespaceMap = BTreeMap<String, Arc<dyn CacheNamespace>>;

/// Result of one sweep across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub namespaces: usize,
    /// Entries removed because they had expired.
    pub expired: usize,
    /// Entries removed to restore capacity limits.
    pub evicted: usize,
    pub duration: Duration,
}

/// Owns one [`NamespaceStore`] per namespace.
pub struct CacheManager {
    config: CacheManagerConfig,
    namespaces: RwLock<NamespaceMap>,
}

impl CacheManager {
    /// Create a cache manager.
    pub fn new(config: CacheManagerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Create a cache manager with the default namespaces.
    pub fn with_defaults() -> Self {
        Self::from_valid(CacheManagerConfig::default())
    }

    fn from_valid(config: CacheManagerConfig) -> Self {
        Self {
            config,
            namespaces: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get the manager configuration.
    pub fn config(&self) -> &CacheManagerConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, NamespaceMap> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NamespaceMap> {
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn existing(&self, name: &str) -> Option<Arc<dyn CacheNamespace>> {
        self.read().get(name).cloned()
    }

    /// Get a namespace, creating it on first use.
    ///
    /// Returns `NamespaceTypeMismatch` if the namespace already exists with a
    /// different value type.
    pub fn namespace<T>(&self, name: &str) -> VantageResult<Arc<NamespaceStore<T>>>
    where
        T: Send + Sync + 'static,
    {
        let erased = match self.existing(name) {
            Some(existing) => existing,
            None => {
                let mut namespaces = self.write();
                let entry = namespaces.entry(name.to_string()).or_insert_with(|| {
                    let config = self.config.namespace_config(name);
                    tracing::info!(
                        namespace = name,
                        ttl_secs = config.ttl.as_secs(),
                        max_entries = config.max_entries,
                        max_bytes = config.max_bytes,
                        "Created cache namespace"
                    );
                    let store: Arc<dyn CacheNamespace> =
                        Arc::new(NamespaceStore::<T>::new(name, config));
                    store
                });
                Arc::clone(entry)
            }
        };

        erased
            .into_any()
            .downcast::<NamespaceStore<T>>()
            .map_err(|_| {
                CacheError::NamespaceTypeMismatch {
                    namespace: name.to_string(),
                }
                .into()
            })
    }

    /// Look up a value. Internal errors degrade to a miss.
    pub fn get<T>(&self, namespace: &str, key: &CacheKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        match self.namespace::<T>(namespace) {
            Ok(store) => store.get(key),
            Err(e) => {
                tracing::warn!(namespace, key = %key, error = %e, "Cache read degraded to miss");
                None
            }
        }
    }

    /// Store a value with the namespace's default TTL.
    pub fn put<T>(&self, namespace: &str, key: CacheKey, value: Arc<T>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let ttl = self.config.namespace_config(namespace).ttl;
        self.put_with_ttl(namespace, key, value, ttl);
    }

    /// Store a value with an explicit TTL. Internal errors skip the write.
    pub fn put_with_ttl<T>(&self, namespace: &str, key: CacheKey, value: Arc<T>, ttl: Duration)
    where
        T: Serialize + Send + Sync + 'static,
    {
        match self.namespace::<T>(namespace) {
            Ok(store) => store.put_shared(key, value, ttl),
            Err(e) => {
                tracing::warn!(namespace, key = %key, error = %e, "Cache write skipped");
            }
        }
    }

    /// True if the namespace holds a live entry for the key. Does not count as a lookup.
    pub fn contains(&self, namespace: &str, key: &CacheKey) -> bool {
        self.existing(namespace)
            .is_some_and(|store| store.contains_key_at(key, Utc::now()))
    }

    /// Remove one key from a namespace. Returns true if it was resident.
    pub fn invalidate(&self, namespace: &str, key: &CacheKey) -> bool {
        self.existing(namespace)
            .is_some_and(|store| store.invalidate_key(key))
    }

    /// Remove expired entries from every namespace and re-assert limits.
    pub fn run_sweep(&self) -> SweepReport {
        self.run_sweep_at(Utc::now())
    }

    /// Sweep as of `now`.
    pub fn run_sweep_at(&self, now: Timestamp) -> SweepReport {
        let started = Instant::now();
        let namespaces: Vec<_> = self.read().values().cloned().collect();

        let mut report = SweepReport {
            namespaces: namespaces.len(),
            ..Default::default()
        };
        for store in namespaces {
            let (expired, evicted) = store.sweep_at(now);
            if expired > 0 || evicted > 0 {
                tracing::debug!(
                    namespace = store.namespace_name(),
                    expired,
                    evicted,
                    "Swept cache namespace"
                );
            }
            report.expired += expired;
            report.evicted += evicted;
        }
        report.duration = started.elapsed();
        report
    }

    /// Metrics for every namespace, including configured ones not yet used.
    pub fn aggregate_metrics(&self) -> AggregateMetrics {
        let mut metrics: BTreeMap<String, NamespaceMetrics> = self
            .read()
            .iter()
            .map(|(name, store)| (name.clone(), store.snapshot()))
            .collect();

        for (name, config) in &self.config.namespaces {
            metrics
                .entry(name.clone())
                .or_insert_with(|| empty_metrics(name, config));
        }

        AggregateMetrics::from_namespaces(metrics.into_values(), Utc::now())
    }

    /// Operator-facing metrics report.
    pub fn metrics_report(&self, detailed: bool) -> CacheMetricsReport {
        self.aggregate_metrics().to_report(detailed)
    }

    /// Health diagnostics against the configured thresholds.
    pub fn health(&self) -> CacheHealthReport {
        assess_health(&self.aggregate_metrics(), &self.config.health)
    }

    /// Remove every entry in every namespace. Counters are kept.
    pub fn clear_all(&self) -> usize {
        let namespaces: Vec<_> = self.read().values().cloned().collect();
        let removed = namespaces.iter().map(|store| store.clear_entries()).sum();
        tracing::info!(removed, "Cleared all cache namespaces");
        removed
    }

    /// Remove every entry in one namespace.
    ///
    /// Configured namespaces that were never used clear zero entries; names
    /// that are neither configured nor in use are an error.
    pub fn clear_namespace(&self, name: &str) -> VantageResult<usize> {
        let removed = match self.existing(name) {
            Some(store) => store.clear_entries(),
            None if self.config.is_configured(name) => 0,
            None => {
                return Err(CacheError::UnknownNamespace {
                    namespace: name.to_string(),
                }
                .into())
            }
        };
        tracing::info!(namespace = name, removed, "Cleared cache namespace");
        Ok(removed)
    }

    /// Names of namespaces in use or configured.
    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        for name in self.config.namespaces.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn empty_metrics(name: &str, config: &NamespaceConfig) -> NamespaceMetrics {
    NamespaceMetrics {
        namespace: name.to_string(),
        max_entries: config.max_entries,
        max_bytes: config.max_bytes,
        ..Default::default()
    }
}
