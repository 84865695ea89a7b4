//! Error Types for the Vantage API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversion from the core error type
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use vantage_core::{
    AnalysisError, CacheError, ConfigError, CoordinatorError, ValidationError, VantageError,
};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// URL is empty or has no host
    InvalidUrl,

    /// Request contains invalid input data
    InvalidInput,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Cache namespace is neither configured nor in use
    UnknownNamespace,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// The task was canceled before it produced a result
    Canceled,

    // ========================================================================
    // Upstream Errors (502, 503, 504)
    // ========================================================================
    /// The scraper failed
    ScrapeFailed,

    /// The AI analysis failed
    AnalysisFailed,

    /// Admission queue is full
    CapacityExceeded,

    /// Gave up waiting for the result
    Timeout,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidUrl | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::UnknownNamespace => StatusCode::NOT_FOUND,

            ErrorCode::Canceled => StatusCode::CONFLICT,

            ErrorCode::ScrapeFailed | ErrorCode::AnalysisFailed => StatusCode::BAD_GATEWAY,

            ErrorCode::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "Invalid URL",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::UnknownNamespace => "Unknown cache namespace",
            ErrorCode::Canceled => "Request was canceled",
            ErrorCode::ScrapeFailed => "Failed to scrape the website",
            ErrorCode::AnalysisFailed => "Failed to analyze the website",
            ErrorCode::CapacityExceeded => "Too many analyses queued",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<VantageError> for ApiError {
    fn from(err: VantageError) -> Self {
        let message = err.to_string();
        let code = match &err {
            VantageError::Validation(ValidationError::InvalidUrl { .. }) => ErrorCode::InvalidUrl,
            VantageError::Validation(ValidationError::InvalidValue { .. }) => {
                ErrorCode::InvalidInput
            }
            VantageError::Cache(CacheError::UnknownNamespace { .. }) => {
                ErrorCode::UnknownNamespace
            }
            VantageError::Analysis(AnalysisError::ScrapeFailed { .. }) => ErrorCode::ScrapeFailed,
            VantageError::Analysis(AnalysisError::AnalysisFailed { .. }) => {
                ErrorCode::AnalysisFailed
            }
            VantageError::Coordinator(CoordinatorError::Timeout { .. }) => ErrorCode::Timeout,
            VantageError::Coordinator(CoordinatorError::Canceled { .. }) => ErrorCode::Canceled,
            VantageError::Coordinator(CoordinatorError::CapacityExceeded { .. }) => {
                ErrorCode::CapacityExceeded
            }
            VantageError::Coordinator(
                CoordinatorError::TaskPanicked { .. } | CoordinatorError::TypeMismatch { .. },
            )
            | VantageError::Cache(_)
            | VantageError::Config(ConfigError::InvalidValue { .. })
            | VantageError::Collaborator(_) => ErrorCode::InternalError,
        };

        if code == ErrorCode::InternalError {
            // Log the full error; the body stays generic.
            tracing::error!(error = %message, "Internal error");
            return ApiError::from_code(code);
        }
        ApiError::new(code, message)
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::InvalidUrl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::UnknownNamespace.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ScrapeFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::AnalysisFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::Canceled.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::CapacityExceeded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_vantage_error() {
        let err: ApiError = VantageError::from(AnalysisError::ScrapeFailed {
            url: "https://acme.test".to_string(),
            reason: "connection refused".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ScrapeFailed);
        assert!(err.message.contains("https://acme.test"));

        let err: ApiError = VantageError::from(CoordinatorError::Timeout {
            key: "scrape:https://acme.test".to_string(),
            waited: Duration::from_secs(5),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err: ApiError = VantageError::collaborator("secret upstream detail").into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("secret"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::from_code(ErrorCode::UnknownNamespace);
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("UNKNOWN_NAMESPACE"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::internal_error("boom");
        assert_eq!(err.to_string(), "InternalError: boom");
    }
}
