//! Vantage Test Utilities
//!
//! Shared test infrastructure for the Vantage workspace:
//! - Instrumented mock collaborators (scraper, analyzer)
//! - Proptest generators for URLs
//! - Fixtures for common records

pub use vantage_core::{
    AnalysisResult, AnalyzeOptions, Analyzer, NormalizedUrl, ScrapedContent, Scraper,
    UrlNormalizer, VantageError, VantageResult, WebsiteAnalysis,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Behavior shared by the mock collaborators.
///
/// Clones share the call counter, so a test can hand one clone to the code
/// under test and keep another to read the count.
#[derive(Debug, Clone, Default)]
struct MockBehavior {
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MockBehavior {
    async fn enter(&self) -> VantageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| VantageError::collaborator(e.to_string()))?;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(reason) => Err(VantageError::collaborator(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Mock scraper that counts invocations.
#[derive(Debug, Clone, Default)]
pub struct MockScraper {
    behavior: MockBehavior,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a collaborator error carrying `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let mut scraper = Self::new();
        scraper.behavior.failure = Some(reason.into());
        scraper
    }

    /// Each call waits for a permit from `gate` before returning.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.behavior.gate = Some(gate);
        self
    }

    /// Each call sleeps for `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = Some(delay);
        self
    }

    /// Number of `scrape` calls so far.
    pub fn calls(&self) -> usize {
        self.behavior.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn scrape(&self, url: &str) -> VantageResult<ScrapedContent> {
        self.behavior.enter().await?;
        Ok(fixtures::sample_content(url))
    }
}

/// Mock analyzer that counts invocations.
#[derive(Debug, Clone, Default)]
pub struct MockAnalyzer {
    behavior: MockBehavior,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a collaborator error carrying `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let mut analyzer = Self::new();
        analyzer.behavior.failure = Some(reason.into());
        analyzer
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.behavior.gate = Some(gate);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = Some(delay);
        self
    }

    /// Number of `analyze` calls so far.
    pub fn calls(&self) -> usize {
        self.behavior.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, content: &ScrapedContent) -> VantageResult<WebsiteAnalysis> {
        self.behavior.enter().await?;
        Ok(fixtures::analysis_of(content))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for URLs.

    use proptest::prelude::*;

    /// Lower-case host such as `abc.test`.
    pub fn arb_host() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,10}\\.(test|com|org)"
    }

    /// Path of zero to three lower-case segments, without a trailing slash.
    pub fn arb_path() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9]{1,8}", 0..3).prop_map(|segments| {
            segments
                .into_iter()
                .map(|s| format!("/{s}"))
                .collect::<String>()
        })
    }

    /// Absolute `https` URL.
    pub fn arb_url() -> impl Strategy<Value = String> {
        (arb_host(), arb_path()).prop_map(|(host, path)| format!("https://{host}{path}"))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;
    use chrono::Utc;

    /// Normalize with the default normalizer.
    ///
    /// # Panics
    /// If `raw` is not a valid URL.
    pub fn normalized(raw: &str) -> NormalizedUrl {
        UrlNormalizer::default()
            .normalize(raw)
            .expect("fixture URL must be valid")
    }

    /// Scraped content for `url` with a small HTML body.
    pub fn sample_content(url: &str) -> ScrapedContent {
        ScrapedContent {
            url: url.to_string(),
            title: Some("Acme Storefront".to_string()),
            html: "<html><body><p>x</p></body></html>".to_string(),
            text: "x".to_string(),
            scraped_at: Utc::now(),
        }
    }

    /// Analysis derived from `content`.
    pub fn analysis_of(content: &ScrapedContent) -> WebsiteAnalysis {
        WebsiteAnalysis {
            summary: format!("Analysis of {}", content.url),
            insights: vec![
                "Homepage loads a single product grid".to_string(),
                "No structured data found".to_string(),
            ],
            score: Some(72.5),
            model: "mock-model".to_string(),
            analyzed_at: Utc::now(),
        }
    }

    /// Analysis for `https://acme.test`.
    pub fn sample_analysis() -> WebsiteAnalysis {
        analysis_of(&sample_content("https://acme.test"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scraper_counts_calls_across_clones() {
        let scraper = MockScraper::new();
        let shared = scraper.clone();

        let content = shared.scrape("https://acme.test").await.expect("content");
        assert_eq!(content.url, "https://acme.test");
        assert_eq!(scraper.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_analyzer() {
        let analyzer = MockAnalyzer::failing("model overloaded");
        let err = analyzer
            .analyze(&fixtures::sample_content("https://acme.test"))
            .await
            .unwrap_err();
        assert_eq!(err, VantageError::collaborator("model overloaded"));
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_gate_holds_call_until_released() {
        let gate = Arc::new(Semaphore::new(0));
        let scraper = MockScraper::new().with_gate(Arc::clone(&gate));

        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            scraper.scrape("https://acme.test"),
        )
        .await;
        assert!(pending.is_err());

        gate.add_permits(1);
        assert!(scraper.scrape("https://acme.test").await.is_ok());
    }

    #[test]
    fn test_fixtures() {
        let analysis = fixtures::sample_analysis();
        assert_eq!(analysis.summary, "Analysis of https://acme.test");
        assert_eq!(fixtures::normalized("HTTPS://Acme.test/").as_str(), "https://acme.test");
    }
}
