//! Metrics definitions for the relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sb_` prefix for the service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: 5 values (the service has a fixed route table)
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: bounded by the admission error variants
//! - `operation`: bounded by code (is_member, fetch_profile)
//! - `event`: bounded by the wire event names
//!
//! # SLO Alignment
//!
//! - HTTP request p95 < 200ms
//! - Admission (two directory lookups + token check) p95 < 100ms
//! - DB query p99 < 50ms

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // HTTP request buckets aligned with 200ms p95 SLO target
        .set_buckets_for_metric(
            Matcher::Prefix("sb_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Admission buckets: dominated by the two directory lookups
        .set_buckets_for_metric(
            Matcher::Prefix("sb_admission".to_string()),
            &[
                0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set admission buckets: {e}"))?
        // DB query buckets aligned with 50ms p99 SLO target
        .set_buckets_for_metric(
            Matcher::Prefix("sb_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `sb_http_requests_total`, `sb_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like
/// 400 Bad Request, 404 Not Found and 405 Method Not Allowed. WebSocket
/// upgrades are recorded once at upgrade time (101), not per frame.
///
/// SLO target: p95 < 200ms
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    // Normalize endpoint to prevent cardinality explosion
    let normalized_endpoint = normalize_endpoint(endpoint);

    // Determine status category for simplified querying
    let status = categorize_status_code(status_code);

    histogram!("sb_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sb_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        // 101 Switching Protocols is the success response of /ws
        101 | 200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
///
/// The route table is fixed, so anything unknown collapses to "/other".
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" => "/".to_string(),
        "/health" => "/health".to_string(),
        "/ready" => "/ready".to_string(),
        "/metrics" => "/metrics".to_string(),
        "/ws" => "/ws".to_string(),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record one admission attempt.
///
/// Metric: `sb_admissions_total`, `sb_admission_duration_seconds`
/// Labels: `outcome`
///
/// Outcomes: "admitted" plus the refusal labels ("missing_credentials",
/// "unauthenticated", "not_a_member", "profile_unavailable", "room_full",
/// "internal").
pub fn record_admission(outcome: &str, duration: Duration) {
    histogram!("sb_admission_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sb_admissions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `sb_db_query_duration_seconds`, `sb_db_queries_total`
/// Labels: `operation`, `status`
///
/// Operations: is_member, fetch_profile, readiness_ping
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("sb_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sb_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Presence & Relay Metrics
// ============================================================================

/// Record a presence fan-out caused by a registry commit or status change.
///
/// Metric: `sb_presence_events_total`
/// Labels: `event` ("join", "leave", "status_change")
pub fn record_presence_event(event: &str) {
    counter!("sb_presence_events_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record a signal relay attempt.
///
/// Metric: `sb_signals_relayed_total`
/// Labels: `event` (wire event name), `outcome` ("delivered", "dropped",
/// "encode_error")
pub fn record_signal_relay(event: &str, outcome: &str) {
    counter!("sb_signals_relayed_total",
        "event" => event.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the live connection count.
///
/// Metric: `sb_connections_active`
pub fn set_connections_active(count: usize) {
    gauge!("sb_connections_active").set(count as f64);
}

/// Set the non-empty room count.
///
/// Metric: `sb_rooms_active`
pub fn set_rooms_active(count: usize) {
    gauge!("sb_rooms_active").set(count as f64);
}

// ============================================================================
// Tests
// ============================================================================
