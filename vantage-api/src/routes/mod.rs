//! REST API Routes Module
//!
//! Route handlers grouped by concern:
//! - Website analyses (run and poll)
//! - Cache metrics, health, and clearing
//! - Coordinator metrics
//! - Liveness

pub mod analysis;
pub mod cache;
pub mod health;
pub mod queue;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::service::VantageService;

pub use analysis::create_router as analysis_router;
pub use cache::create_router as cache_router;
pub use health::create_router as health_router;
pub use queue::create_router as queue_router;

/// Build the full API router with request tracing.
pub fn create_api_router(service: Arc<VantageService>) -> Router {
    Router::new()
        .nest("/api/v1/analyses", analysis_router(Arc::clone(&service)))
        .nest("/api/v1/cache", cache_router(Arc::clone(&service)))
        .nest("/api/v1/queue", queue_router(service))
        .nest("/health", health_router())
        .layer(TraceLayer::new_for_http())
}
