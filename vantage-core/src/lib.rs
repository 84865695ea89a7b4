//! Vantage Core - Shared Types
//!
//! Errors, configuration, cache keys, analysis records, and the collaborator
//! traits. Every other Vantage crate depends on this one; it holds no
//! runtime state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod analysis;
pub mod config;
pub mod error;
pub mod key;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 identifier (timestamp-sortable).
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

pub use analysis::{
    AnalysisResult, AnalysisState, AnalyzeOptions, Analyzer, ScrapedContent, Scraper,
    WebsiteAnalysis,
};
pub use config::{
    CacheManagerConfig, CoordinatorConfig, HealthThresholds, NamespaceConfig,
    AI_ANALYSIS_NAMESPACE, FINAL_ANALYSIS_NAMESPACE, SCRAPED_NAMESPACE,
};
pub use error::{
    AnalysisError, CacheError, ConfigError, CoordinatorError, ValidationError, VantageError,
    VantageResult,
};
pub use key::{variant_tag, CacheKey, NormalizedUrl, UrlNormalizer};
