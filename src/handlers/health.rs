//! Health and metrics endpoints

use axum::{extract::State, response::Json};

use crate::app_state::AppState;

/// Service health check
/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is healthy"))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "notification-service",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Prometheus metrics exposition
/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}
