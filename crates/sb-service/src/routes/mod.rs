//! HTTP routes for the relay.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::directory::RoomDirectory;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::registry::RoomRegistry;
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Room membership and per-connection outbound channels.
    pub registry: Arc<RoomRegistry>,

    /// Credential verifier consulted at admission.
    pub verifier: Arc<dyn TokenVerifier>,

    /// Membership and profile lookups consulted at admission.
    pub directory: Arc<dyn RoomDirectory>,

    /// Cancelled when the process is draining; sessions close on it.
    pub shutdown: CancellationToken,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (checks DB)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/ws` - WebSocket endpoint clients join rooms through
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout on the plain HTTP endpoints
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Sessions on /ws outlive any sane request timeout, so the timeout
    // layer covers only the plain HTTP group.
    let http_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone())
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let ws_routes = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .with_state(state);

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - Log request details
    // 2. http_metrics_middleware - Record ALL responses (outermost)
    http_routes
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        // HTTP metrics layer (outermost) - captures ALL responses including
        // framework-level errors like 400, 404, 405
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::mock::StaticTokenVerifier;
    use crate::directory::mock::InMemoryDirectory;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use tower::ServiceExt;

    #[test]
    fn test_app_state_is_clone() {
        // This test verifies that AppState implements Clone,
        // which is required for Axum's State extractor.
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Config>();
    }

    /// Router with in-memory collaborators and a lazy pool that never
    /// connects; enough to drive the plain HTTP surface with oneshot.
    fn test_router() -> Router {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://sb:sb@127.0.0.1:1/unreachable".to_string(),
            ),
            ("SB_JWT_SECRET".to_string(), "routes-test-secret".to_string()),
        ]);
        let config = Config::from_vars(&vars).expect("test config loads");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool builds without a server");

        let state = Arc::new(AppState {
            pool,
            registry: Arc::new(RoomRegistry::new(config.max_room_size)),
            verifier: Arc::new(StaticTokenVerifier::new()),
            directory: Arc::new(InMemoryDirectory::new()),
            shutdown: CancellationToken::new(),
            config,
        });

        // Standalone recorder: no global install, each test gets its own.
        let recorder = PrometheusBuilder::new().build_recorder();
        build_routes(state, recorder.handle())
    }

    #[tokio::test]
    async fn test_health_route_responds_ok() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route_renders() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_route_rejects_plain_get() {
        // Without the upgrade headers the WebSocket route refuses the
        // request before any admission logic runs.
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/ws?token=x&room=r1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
