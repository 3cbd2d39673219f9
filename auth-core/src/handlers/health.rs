use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::services::metrics::get_metrics;
use crate::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.store.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            "down"
        }
    };
    let status = if store == "up" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if store == "up" { "healthy" } else { "unhealthy" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "store": store,
            "auditQueue": {
                "pending": state.audit.pending(),
                "dropped": state.audit.dropped_count(),
            },
        })),
    )
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    get_metrics()
}
