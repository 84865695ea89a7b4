//! Cache Routes
//!
//! - `GET /api/v1/cache/metrics?detailed=` hit rates and memory use
//! - `GET /api/v1/cache/health` warnings and recommendations
//! - `DELETE /api/v1/cache/{target}` clears one namespace or `all`

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vantage_cache::{CacheHealthReport, CacheMetricsReport};

use crate::error::ApiResult;
use crate::service::VantageService;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub detailed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub message: String,
}

/// GET /api/v1/cache/metrics
pub async fn cache_metrics(
    State(service): State<Arc<VantageService>>,
    Query(query): Query<MetricsQuery>,
) -> Json<CacheMetricsReport> {
    Json(service.cache_metrics(query.detailed))
}

/// GET /api/v1/cache/health
pub async fn cache_health(State(service): State<Arc<VantageService>>) -> Json<CacheHealthReport> {
    Json(service.cache_health())
}

/// DELETE /api/v1/cache/{target}
pub async fn clear_cache(
    State(service): State<Arc<VantageService>>,
    Path(target): Path<String>,
) -> ApiResult<Json<ClearCacheResponse>> {
    let message = service.clear_cache(&target)?;
    Ok(Json(ClearCacheResponse { message }))
}

pub fn create_router(service: Arc<VantageService>) -> Router {
    Router::new()
        .route("/metrics", get(cache_metrics))
        .route("/health", get(cache_health))
        .route("/:target", delete(clear_cache))
        .with_state(service)
}
