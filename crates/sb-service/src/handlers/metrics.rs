//! Prometheus metrics endpoint handler.
//!
//! Provides the `/metrics` endpoint for Prometheus scraping.
//!
//! # Security
//!
//! This endpoint is unauthenticated to allow Prometheus to scrape metrics.
//! No PII or secrets are exposed in metrics, only operational data with
//! bounded cardinality labels.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping:
/// ```text
/// # TYPE sb_admissions_total counter
/// sb_admissions_total{outcome="admitted"} 42
/// ```
#[tracing::instrument(skip_all, name = "sb.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
mod tests {
    // Note: Testing the metrics endpoint requires a PrometheusHandle,
    // which can only be created once per process via PrometheusBuilder.
    // Integration tests in health_tests.rs verify the full endpoint.
}
