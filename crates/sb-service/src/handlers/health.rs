//! Health check handlers.
//!
//! Provides health check endpoints for Kubernetes liveness and readiness probes.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the membership store

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::observability::metrics;
use crate::routes::AppState;

/// Readiness probe response body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler.
///
/// Returns a simple "OK" response to indicate the process is running.
/// Does NOT check any dependencies - failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Pings the membership store; returns 200 if ready, 503 if not. Error
/// messages are intentionally generic so infrastructure details never leave
/// the process; the actual error is logged server-side.
#[tracing::instrument(skip_all, name = "sb.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();
    let db_check = sqlx::query("SELECT 1").fetch_one(&state.pool).await;

    match db_check {
        Ok(_) => {
            metrics::record_db_query("readiness_ping", "success", start.elapsed());
            (
                StatusCode::OK,
                Json(ReadinessResponse {
                    status: "ready",
                    database: "healthy",
                    error: None,
                }),
            )
        }
        Err(e) => {
            metrics::record_db_query("readiness_ping", "error", start.elapsed());
            tracing::warn!(target: "sb.health", "Readiness check failed: database error: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    database: "unhealthy",
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
