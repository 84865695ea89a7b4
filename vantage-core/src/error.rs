//! Error types for Vantage operations

use std::time::Duration;
use thiserror::Error;

/// Analysis pipeline errors. Each variant names the phase that failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Scrape failed for {url}: {reason}")]
    ScrapeFailed { url: String, reason: String },

    #[error("Analysis failed for {url}: {reason}")]
    AnalysisFailed { url: String, reason: String },
}

/// Request coordinator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Task {key} was canceled")]
    Canceled { key: String },

    #[error("Timed out after {waited:?} waiting for task {key}")]
    Timeout { key: String, waited: Duration },

    #[error("Admission queue is full ({limit} tasks queued), rejected {key}")]
    CapacityExceeded { key: String, limit: usize },

    #[error("Task {key} panicked: {reason}")]
    TaskPanicked { key: String, reason: String },

    #[error("Task {key} produced a value of a different type than requested")]
    TypeMismatch { key: String },
}

/// Cache layer errors. Most are recovered locally and never reach callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Unknown cache namespace: {namespace}")]
    UnknownNamespace { namespace: String },

    #[error("Cache namespace {namespace} holds a different value type")]
    NamespaceTypeMismatch { namespace: String },

    #[error("Failed to estimate entry size: {reason}")]
    SizeEstimation { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Vantage errors.
///
/// Every variant is `Clone` so a single task outcome can be handed to any
/// number of waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VantageError {
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Failure reported by an external collaborator (scraper, model client).
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl VantageError {
    /// Build a collaborator error from any displayable message.
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    /// True if this error is a cancellation delivered by the coordinator.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Coordinator(CoordinatorError::Canceled { .. }))
    }

    /// True if this error is a caller-side wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Coordinator(CoordinatorError::Timeout { .. }))
    }
}

/// Result type alias for Vantage operations.
pub type VantageResult<T> = Result<T, VantageError>;

// =============================================================================
// TESTS
// =============================================================================
