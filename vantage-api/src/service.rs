//! Vantage Service Facade
//!
//! Composition root: owns the cache manager, the request coordinator, the
//! orchestrator, and the background sweep task. HTTP handlers and embedding
//! applications talk to this type only.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vantage_cache::{
    cache_sweep_task, CacheHealthReport, CacheManager, CacheMetricsReport, SweepMetrics,
    SweepSnapshot,
};
use vantage_core::{AnalysisResult, AnalysisState, AnalyzeOptions, Analyzer, Scraper, VantageResult};
use vantage_queue::{CoordinatorMetricsSnapshot, RequestCoordinator};

use crate::config::ServiceConfig;
use crate::orchestrator::AnalysisOrchestrator;

/// Target accepted by [`VantageService::clear_cache`] to clear every namespace.
pub const CLEAR_ALL: &str = "all";

pub struct VantageService {
    config: ServiceConfig,
    cache: Arc<CacheManager>,
    orchestrator: AnalysisOrchestrator,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<Arc<SweepMetrics>>>>,
}

impl std::fmt::Debug for VantageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VantageService")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl VantageService {
    /// Build the service. Does not start the sweep task; see
    /// [`start_sweeper`](Self::start_sweeper).
    pub fn new(
        config: ServiceConfig,
        scraper: Arc<dyn Scraper>,
        analyzer: Arc<dyn Analyzer>,
    ) -> VantageResult<Self> {
        config.validate()?;

        let cache = Arc::new(CacheManager::new(config.cache.clone())?);
        let coordinator = RequestCoordinator::new(config.coordinator.clone())?;
        let orchestrator =
            AnalysisOrchestrator::new(Arc::clone(&cache), coordinator, scraper, analyzer)
                .with_normalizer(config.url_normalizer())
                .with_default_priority(config.default_priority)
                .with_wait_timeout(config.wait_timeout);

        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!(
            max_concurrent = config.coordinator.max_concurrent,
            grace_ms = config.coordinator.completed_grace.as_millis() as u64,
            namespaces = config.cache.namespaces.len(),
            "Vantage service initialized"
        );

        Ok(Self {
            config,
            cache,
            orchestrator,
            shutdown_tx,
            sweeper: Mutex::new(None),
        })
    }

    /// Spawn the background cache sweep. Calling it again is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }
        *sweeper = Some(tokio::spawn(cache_sweep_task(
            Arc::clone(&self.cache),
            self.config.cache.sweep_interval,
            self.shutdown_tx.subscribe(),
        )));
    }

    /// Stop the sweep task and wait for it to finish.
    ///
    /// Returns the sweep counters, or `None` if the sweeper never started.
    pub async fn shutdown(&self) -> Option<SweepSnapshot> {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let _ = self.shutdown_tx.send(true);

        match handle.await {
            Ok(metrics) => Some(metrics.snapshot()),
            Err(e) => {
                tracing::warn!(error = %e, "Cache sweep task did not shut down cleanly");
                None
            }
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        self.orchestrator.coordinator()
    }

    pub async fn analyze_website(
        &self,
        url: &str,
        options: AnalyzeOptions,
    ) -> VantageResult<Arc<AnalysisResult>> {
        self.orchestrator.analyze_website(url, options).await
    }

    pub fn analysis_state(&self, url: &str) -> VantageResult<AnalysisState> {
        self.orchestrator.state(url)
    }

    /// Cache metrics; `detailed` adds the per-namespace breakdown.
    pub fn cache_metrics(&self, detailed: bool) -> CacheMetricsReport {
        self.cache.metrics_report(detailed)
    }

    pub fn cache_health(&self) -> CacheHealthReport {
        self.cache.health()
    }

    /// Clear one namespace, or every namespace for [`CLEAR_ALL`].
    ///
    /// Returns a human-readable confirmation.
    pub fn clear_cache(&self, target: &str) -> VantageResult<String> {
        if target.eq_ignore_ascii_case(CLEAR_ALL) {
            let removed = self.cache.clear_all();
            return Ok(format!("Cleared all caches ({} entries removed)", removed));
        }

        let removed = self.cache.clear_namespace(target)?;
        Ok(format!(
            "Cleared cache namespace '{}' ({} entries removed)",
            target, removed
        ))
    }

    pub fn coordinator_metrics(&self) -> CoordinatorMetricsSnapshot {
        self.coordinator().metrics()
    }
}
