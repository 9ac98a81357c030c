//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use odds_services::CacheStats;
use odds_vendor::QuotaSnapshot;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    vendor_configured: bool,
    cache: CacheStats,
    /// Last request quota reported by the vendor
    quota: Option<QuotaSnapshot>,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let service = &state.odds_service;
    let vendor_configured = service.config().api_key.is_some();
    let quota = service.quota();
    let exhausted = quota.and_then(|q| q.remaining) == Some(0);

    let status = if vendor_configured && !exhausted {
        "healthy"
    } else {
        "degraded"
    };

    let response = HealthResponse {
        status: status.to_string(),
        vendor_configured,
        cache: service.cache().stats(),
        quota,
    };

    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
