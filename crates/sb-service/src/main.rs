//! Switchboard Relay
//!
//! Entry point for the Switchboard room-presence and signaling relay.
//! Admits WebSocket clients into rooms, fans out presence events, and
//! forwards peer negotiation messages.

use anyhow::Context;
use sb_service::auth::JwtVerifier;
use sb_service::config::Config;
use sb_service::directory::PgRoomDirectory;
use sb_service::observability::metrics::init_metrics_recorder;
use sb_service::registry::RoomRegistry;
use sb_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sb_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Switchboard relay");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        bind_address = %config.bind_address,
        max_room_size = config.max_room_size,
        "Configuration loaded successfully"
    );

    // Initialize database connection pool with query timeout
    info!("Connecting to membership store...");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to membership store")?;

    info!("Membership store connection established");

    // Install the Prometheus recorder before anything records
    let metrics_handle = init_metrics_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {e}"))?;

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();

    // Cancelled at shutdown so live sessions close and their rooms hear
    // presence:leave before the process exits.
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        pool: pool.clone(),
        registry: Arc::new(RoomRegistry::new(config.max_room_size)),
        verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        directory: Arc::new(PgRoomDirectory::new(pool)),
        shutdown: shutdown.clone(),
        config,
    });

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    // Parse bind address
    let addr: SocketAddr = bind_address.parse().context("Invalid bind address")?;

    info!("Switchboard relay listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    info!("Switchboard relay shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// Returns when a shutdown signal is received and the drain period is
/// complete. During the drain the server keeps serving so load balancers can
/// move traffic away; afterwards the cancellation token closes every live
/// session, which delivers presence:leave to the remaining members.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("SB_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (SB_DRAIN_SECONDS=0)");
    }

    shutdown.cancel();
}
