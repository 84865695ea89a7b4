//! Coordinator Routes

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use vantage_queue::CoordinatorMetricsSnapshot;

use crate::service::VantageService;

/// GET /api/v1/queue/metrics - Admission counters and queue gauges
pub async fn queue_metrics(
    State(service): State<Arc<VantageService>>,
) -> Json<CoordinatorMetricsSnapshot> {
    Json(service.coordinator_metrics())
}

pub fn create_router(service: Arc<VantageService>) -> Router {
    Router::new()
        .route("/metrics", get(queue_metrics))
        .with_state(service)
}
