//! Analysis records and the collaborator traits the core consumes.
//!
//! The scraper and the model client live outside this workspace. The core only
//! sees them through [`Scraper`] and [`Analyzer`], treating both as opaque,
//! potentially slow, potentially failing calls.

use crate::error::VantageResult;
use crate::key::NormalizedUrl;
use crate::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Content returned by the scraper for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedContent {
    /// URL that was scraped.
    pub url: String,
    /// Page title, when the scraper found one.
    pub title: Option<String>,
    /// Raw page markup.
    pub html: String,
    /// Visible text extracted by the scraper.
    pub text: String,
    /// When the page was fetched.
    pub scraped_at: Timestamp,
}

/// Output of the AI analysis for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteAnalysis {
    /// Short prose summary of the site.
    pub summary: String,
    /// Individual findings or recommendations.
    pub insights: Vec<String>,
    /// Optional overall score (0.0 to 100.0).
    pub score: Option<f64>,
    /// Model identifier that produced the analysis.
    pub model: String,
    /// When the analysis finished.
    pub analyzed_at: Timestamp,
}

/// Combined result handed to the caller for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Identifier for the persisted record (UUIDv7).
    pub analysis_id: Uuid,
    /// Canonical URL the result belongs to.
    pub url: NormalizedUrl,
    /// Scraped page content.
    pub scraped: Arc<ScrapedContent>,
    /// AI analysis output.
    pub analysis: Arc<WebsiteAnalysis>,
    /// True if the scrape was served from cache.
    pub scrape_cached: bool,
    /// True if the analysis was served from cache.
    pub analysis_cached: bool,
    /// When the combined result was assembled.
    pub completed_at: Timestamp,
}

/// Caller options for a single analysis request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    /// Ignore cached results and run the pipeline again.
    #[serde(default)]
    pub force_reanalyze: bool,
    /// Admission priority; higher runs first. `None` uses the configured default.
    #[serde(default)]
    pub priority: Option<i32>,
}

impl AnalyzeOptions {
    /// Options that bypass the cache.
    pub fn forced() -> Self {
        Self {
            force_reanalyze: true,
            priority: None,
        }
    }

    /// Set the admission priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Progress of a URL through the pipeline, derived from cache presence and
/// in-flight work rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    NotStarted,
    ScrapePending,
    ScrapeDone,
    AnalysisPending,
    AnalysisDone,
}

impl AnalysisState {
    /// True while work for the URL is queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::ScrapePending | Self::AnalysisPending)
    }
}

/// Page scraper. Implementations must be thread-safe.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch and extract the content of a page.
    async fn scrape(&self, url: &str) -> VantageResult<ScrapedContent>;
}

/// AI analysis client. Implementations must be thread-safe.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze previously scraped content.
    async fn analyze(&self, content: &ScrapedContent) -> VantageResult<WebsiteAnalysis>;
}
