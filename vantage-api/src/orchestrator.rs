//! Analysis Orchestrator
//!
//! Runs the scrape → analyze → assemble pipeline for one URL. Every stage
//! checks its cache namespace first and otherwise runs through the
//! [`RequestCoordinator`], so concurrent requests for the same URL share one
//! scrape, one analysis, and one assembled result.
//!
//! Coordinator keys per normalized URL:
//! - `scrape:{url}` fetches the page and fills `scraped`
//! - `analyze:{url}` runs the model and fills `ai-analysis`
//! - `finalize:{url}` assembles the result and fills `final-analysis`
//!
//! Each stage writes its cache entry from inside the coordinated operation,
//! so a caller that stops waiting still leaves the result cached. A canceled
//! stage writes nothing.
//!
//! The orchestrator does not retry. Failures carry their phase and URL.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use vantage_cache::CacheManager;
use vantage_core::{
    new_id, AnalysisError, AnalysisResult, AnalysisState, AnalyzeOptions, Analyzer, CacheKey,
    CoordinatorError, NormalizedUrl, ScrapedContent, Scraper, UrlNormalizer, VantageError,
    VantageResult, WebsiteAnalysis, AI_ANALYSIS_NAMESPACE, FINAL_ANALYSIS_NAMESPACE,
    SCRAPED_NAMESPACE,
};
use vantage_queue::{RequestCoordinator, TaskToken};

// ============================================================================
// KEYS
// ============================================================================

/// Cache and coordinator keys for one normalized URL.
#[derive(Debug, Clone)]
struct PipelineKeys {
    scraped: CacheKey,
    ai_analysis: CacheKey,
    final_analysis: CacheKey,
    scrape_task: String,
    analyze_task: String,
    finalize_task: String,
}

impl PipelineKeys {
    fn new(url: &NormalizedUrl) -> Self {
        Self {
            scraped: CacheKey::new(SCRAPED_NAMESPACE, url),
            ai_analysis: CacheKey::new(AI_ANALYSIS_NAMESPACE, url),
            final_analysis: CacheKey::new(FINAL_ANALYSIS_NAMESPACE, url),
            scrape_task: format!("scrape:{}", url),
            analyze_task: format!("analyze:{}", url),
            finalize_task: format!("finalize:{}", url),
        }
    }

    fn tasks(&self) -> [&str; 3] {
        [&self.scrape_task, &self.analyze_task, &self.finalize_task]
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Scrape,
    Analysis,
}

/// Tag a pipeline failure with its phase and URL.
///
/// Coordinator outcomes that are not failures of the work itself (cancel,
/// timeout, rejection) and errors already tagged pass through unchanged.
fn phase_error(err: VantageError, phase: Phase, url: &NormalizedUrl) -> VantageError {
    match err {
        VantageError::Coordinator(
            CoordinatorError::Canceled { .. }
            | CoordinatorError::Timeout { .. }
            | CoordinatorError::CapacityExceeded { .. },
        )
        | VantageError::Analysis(_)
        | VantageError::Validation(_) => err,
        other => {
            let url = url.to_string();
            let reason = match other {
                VantageError::Collaborator(reason) => reason,
                other => other.to_string(),
            };
            match phase {
                Phase::Scrape => AnalysisError::ScrapeFailed { url, reason }.into(),
                Phase::Analysis => AnalysisError::AnalysisFailed { url, reason }.into(),
            }
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Composes the cache, the coordinator, and the two collaborators.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    cache: Arc<CacheManager>,
    coordinator: RequestCoordinator,
    scraper: Arc<dyn Scraper>,
    analyzer: Arc<dyn Analyzer>,
    normalizer: UrlNormalizer,
    default_priority: i32,
    wait_timeout: Option<Duration>,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("coordinator", &self.coordinator)
            .field("normalizer", &self.normalizer)
            .field("default_priority", &self.default_priority)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl AnalysisOrchestrator {
    pub fn new(
        cache: Arc<CacheManager>,
        coordinator: RequestCoordinator,
        scraper: Arc<dyn Scraper>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            cache,
            coordinator,
            scraper,
            analyzer,
            normalizer: UrlNormalizer::default(),
            default_priority: 0,
            wait_timeout: None,
        }
    }

    /// Use a normalizer with a query allow-list.
    pub fn with_normalizer(mut self, normalizer: UrlNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Priority for requests that do not set one.
    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    /// Give up waiting on a coordinated stage after `wait`.
    pub fn with_wait_timeout(mut self, wait: Option<Duration>) -> Self {
        self.wait_timeout = wait;
        self
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Analyze a website, reusing cached and in-flight work.
    pub async fn analyze_website(
        &self,
        raw_url: &str,
        options: AnalyzeOptions,
    ) -> VantageResult<Arc<AnalysisResult>> {
        let url = self.normalizer.normalize(raw_url)?;
        let keys = PipelineKeys::new(&url);
        let priority = options.priority.unwrap_or(self.default_priority);

        if options.force_reanalyze {
            self.invalidate(&keys);
            tracing::info!(url = %url, "Forced reanalysis, cached results invalidated");
        } else if let Some(result) = self
            .cache
            .get::<AnalysisResult>(FINAL_ANALYSIS_NAMESPACE, &keys.final_analysis)
        {
            tracing::debug!(
                url = %url,
                analysis_id = %result.analysis_id,
                "Final analysis served from cache"
            );
            return Ok(result);
        }

        let (scraped, scrape_cached) = self.scraped_content(&url, &keys, priority).await?;
        let (analysis, analysis_cached) = self
            .website_analysis(&url, &keys, priority, scraped.clone())
            .await?;

        let cache = Arc::clone(&self.cache);
        let final_key = keys.final_analysis.clone();
        let result_url = url.clone();
        let result = self
            .coordinate(keys.finalize_task.clone(), priority, move |token| async move {
                // A concurrent caller may have assembled it already.
                if let Some(existing) =
                    cache.get::<AnalysisResult>(FINAL_ANALYSIS_NAMESPACE, &final_key)
                {
                    return Ok::<_, VantageError>(existing);
                }
                let result = Arc::new(AnalysisResult {
                    analysis_id: new_id(),
                    url: result_url,
                    scraped,
                    analysis,
                    scrape_cached,
                    analysis_cached,
                    completed_at: Utc::now(),
                });
                if !token.is_canceled() {
                    cache.put(FINAL_ANALYSIS_NAMESPACE, final_key, Arc::clone(&result));
                }
                Ok::<_, VantageError>(result)
            })
            .await
            .map_err(|e| phase_error(e, Phase::Analysis, &url))?;

        tracing::info!(
            url = %url,
            analysis_id = %result.analysis_id,
            scrape_cached = result.scrape_cached,
            analysis_cached = result.analysis_cached,
            "Website analysis completed"
        );
        Ok(result)
    }

    /// Where the pipeline stands for a URL.
    pub fn state(&self, raw_url: &str) -> VantageResult<AnalysisState> {
        let url = self.normalizer.normalize(raw_url)?;
        let keys = PipelineKeys::new(&url);

        let state = if self.coordinator.is_in_flight(&keys.analyze_task)
            || self.coordinator.is_in_flight(&keys.finalize_task)
        {
            AnalysisState::AnalysisPending
        } else if self
            .cache
            .contains(FINAL_ANALYSIS_NAMESPACE, &keys.final_analysis)
            || self.cache.contains(AI_ANALYSIS_NAMESPACE, &keys.ai_analysis)
        {
            AnalysisState::AnalysisDone
        } else if self.coordinator.is_in_flight(&keys.scrape_task) {
            AnalysisState::ScrapePending
        } else if self.cache.contains(SCRAPED_NAMESPACE, &keys.scraped) {
            AnalysisState::ScrapeDone
        } else {
            AnalysisState::NotStarted
        };
        Ok(state)
    }

    async fn scraped_content(
        &self,
        url: &NormalizedUrl,
        keys: &PipelineKeys,
        priority: i32,
    ) -> VantageResult<(Arc<ScrapedContent>, bool)> {
        if let Some(content) = self
            .cache
            .get::<ScrapedContent>(SCRAPED_NAMESPACE, &keys.scraped)
        {
            return Ok((content, true));
        }

        let scraper = Arc::clone(&self.scraper);
        let cache = Arc::clone(&self.cache);
        let cache_key = keys.scraped.clone();
        let target = url.to_string();
        let content = self
            .coordinate(keys.scrape_task.clone(), priority, move |token| async move {
                let content = Arc::new(scraper.scrape(&target).await?);
                if token.is_canceled() {
                    tracing::debug!(url = %target, "Scrape canceled, result not cached");
                } else {
                    cache.put(SCRAPED_NAMESPACE, cache_key, Arc::clone(&content));
                }
                Ok::<_, VantageError>(content)
            })
            .await
            .map_err(|e| phase_error(e, Phase::Scrape, url))?;
        Ok((content, false))
    }

    async fn website_analysis(
        &self,
        url: &NormalizedUrl,
        keys: &PipelineKeys,
        priority: i32,
        scraped: Arc<ScrapedContent>,
    ) -> VantageResult<(Arc<WebsiteAnalysis>, bool)> {
        if let Some(analysis) = self
            .cache
            .get::<WebsiteAnalysis>(AI_ANALYSIS_NAMESPACE, &keys.ai_analysis)
        {
            return Ok((analysis, true));
        }

        let analyzer = Arc::clone(&self.analyzer);
        let cache = Arc::clone(&self.cache);
        let cache_key = keys.ai_analysis.clone();
        let analysis = self
            .coordinate(keys.analyze_task.clone(), priority, move |token| async move {
                let analysis = Arc::new(analyzer.analyze(&scraped).await?);
                if token.is_canceled() {
                    tracing::debug!(url = %scraped.url, "Analysis canceled, result not cached");
                } else {
                    cache.put(AI_ANALYSIS_NAMESPACE, cache_key, Arc::clone(&analysis));
                }
                Ok::<_, VantageError>(analysis)
            })
            .await
            .map_err(|e| phase_error(e, Phase::Analysis, url))?;
        Ok((analysis, false))
    }

    async fn coordinate<T, F, Fut>(
        &self,
        key: String,
        priority: i32,
        operation: F,
    ) -> VantageResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(TaskToken) -> Fut + Send + 'static,
        Fut: Future<Output = VantageResult<T>> + Send + 'static,
    {
        let handle = self
            .coordinator
            .submit_with_token(key, priority, operation)?;
        match self.wait_timeout {
            Some(wait) => handle.wait_timeout(wait).await,
            None => handle.wait().await,
        }
    }

    fn invalidate(&self, keys: &PipelineKeys) {
        self.cache.invalidate(SCRAPED_NAMESPACE, &keys.scraped);
        self.cache.invalidate(AI_ANALYSIS_NAMESPACE, &keys.ai_analysis);
        self.cache
            .invalidate(FINAL_ANALYSIS_NAMESPACE, &keys.final_analysis);
        for task in keys.tasks() {
            self.coordinator.forget(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> NormalizedUrl {
        UrlNormalizer::default().normalize(raw).expect("valid url")
    }

    #[test]
    fn test_pipeline_keys() {
        let keys = PipelineKeys::new(&url("https://Acme.test/"));
        assert_eq!(keys.scraped.as_str(), "scraped:https://acme.test");
        assert_eq!(keys.ai_analysis.as_str(), "ai-analysis:https://acme.test");
        assert_eq!(keys.final_analysis.as_str(), "final-analysis:https://acme.test");
        assert_eq!(
            keys.tasks(),
            [
                "scrape:https://acme.test",
                "analyze:https://acme.test",
                "finalize:https://acme.test"
            ]
        );
    }

    #[test]
    fn test_phase_error_tags_collaborator_failures() {
        let target = url("https://acme.test");
        let err = phase_error(
            VantageError::collaborator("connection refused"),
            Phase::Scrape,
            &target,
        );
        assert_eq!(
            err,
            VantageError::from(AnalysisError::ScrapeFailed {
                url: "https://acme.test".to_string(),
                reason: "connection refused".to_string(),
            })
        );

        let panicked = VantageError::from(CoordinatorError::TaskPanicked {
            key: "analyze:https://acme.test".to_string(),
            reason: "boom".to_string(),
        });
        let err = phase_error(panicked, Phase::Analysis, &target);
        assert!(matches!(
            err,
            VantageError::Analysis(AnalysisError::AnalysisFailed { .. })
        ));
    }

    #[test]
    fn test_phase_error_passes_coordinator_outcomes_through() {
        let target = url("https://acme.test");
        let canceled = VantageError::from(CoordinatorError::Canceled {
            key: "scrape:https://acme.test".to_string(),
        });
        assert_eq!(
            phase_error(canceled.clone(), Phase::Scrape, &target),
            canceled
        );

        let timeout = VantageError::from(CoordinatorError::Timeout {
            key: "analyze:https://acme.test".to_string(),
            waited: Duration::from_secs(1),
        });
        assert!(phase_error(timeout, Phase::Analysis, &target).is_timeout());
    }
}
