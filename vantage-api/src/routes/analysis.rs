//! Website Analysis Routes
//!
//! - `POST /api/v1/analyses` runs (or joins) the pipeline for a URL
//! - `GET /api/v1/analyses/state?url=` reports pipeline progress

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vantage_core::{AnalysisResult, AnalysisState, AnalyzeOptions};

use crate::error::{ApiError, ApiResult};
use crate::service::VantageService;

// ============================================================================
// TYPES
// ============================================================================

/// Request body for running an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub force_reanalyze: bool,
    /// Admission priority; higher runs first.
    #[serde(default)]
    pub priority: Option<i32>,
}

impl AnalyzeRequest {
    fn options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            force_reanalyze: self.force_reanalyze,
            priority: self.priority,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateQuery {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStateResponse {
    pub url: String,
    pub state: AnalysisState,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/v1/analyses - Analyze a website
pub async fn analyze_website(
    State(service): State<Arc<VantageService>>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisResult>> {
    if req.url.trim().is_empty() {
        return Err(ApiError::invalid_input("url is required"));
    }

    let result = service.analyze_website(&req.url, req.options()).await?;
    Ok(Json(AnalysisResult::clone(&result)))
}

/// GET /api/v1/analyses/state - Pipeline progress for a URL
pub async fn analysis_state(
    State(service): State<Arc<VantageService>>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<AnalysisStateResponse>> {
    let state = service.analysis_state(&query.url)?;
    Ok(Json(AnalysisStateResponse {
        url: query.url,
        state,
    }))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router(service: Arc<VantageService>) -> Router {
    Router::new()
        .route("/", post(analyze_website))
        .route("/state", get(analysis_state))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_request_defaults() -> Result<(), serde_json::Error> {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"url":"https://acme.test"}"#)?;
        assert_eq!(req.options(), AnalyzeOptions::default());

        let req: AnalyzeRequest = serde_json::from_str(
            r#"{"url":"https://acme.test","force_reanalyze":true,"priority":3}"#,
        )?;
        assert_eq!(req.options(), AnalyzeOptions::forced().with_priority(3));
        Ok(())
    }
}
