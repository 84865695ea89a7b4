//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//!
//! Cache diagnostics live under `/api/v1/cache/health`.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

pub fn create_router() -> Router {
    Router::new().route("/ping", get(ping))
}
