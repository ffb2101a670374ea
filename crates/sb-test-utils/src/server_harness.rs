//! Test server harness for E2E testing
//!
//! Provides `TestRelayServer` for spawning real relay instances in tests.
//! The server runs the production router (`build_routes`) with in-memory
//! collaborators; the database pool is lazy and never connects, so `/ready`
//! reports not-ready while everything else behaves as in production.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sb_service::auth::{JwtVerifier, TokenVerifier};
use sb_service::config::Config;
use sb_service::directory::mock::InMemoryDirectory;
use sb_service::directory::RoomDirectory;
use sb_service::registry::RoomRegistry;
use sb_service::routes::{self, AppState};
use secrecy::SecretString;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fixtures::{StaticTokenVerifier, TestUser, TEST_JWT_SECRET};

/// Test harness for spawning the relay in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let ada = TestUser::new(1);
/// let server = TestRelayServer::builder()
///     .with_user_in_room(&ada, "r1")
///     .spawn()
///     .await?;
///
/// let mut client = RelayClient::connect(&server.ws_url(Some(&ada.token()), Some("r1"))).await?;
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Configures the collaborators a [`TestRelayServer`] spawns with.
pub struct TestRelayServerBuilder {
    tokens: Vec<(String, i64)>,
    directory: InMemoryDirectory,
    directory_override: Option<Arc<dyn RoomDirectory>>,
    use_jwt_verifier: bool,
    max_room_size: usize,
}

impl TestRelayServerBuilder {
    /// Register a user's profile, put them on `room_id`'s member list, and
    /// accept their static test token.
    #[must_use]
    pub fn with_user_in_room(mut self, user: &TestUser, room_id: &str) -> Self {
        self.tokens.push((user.token(), user.id));
        self.directory = self.directory.with_user_in_room(user.profile(), room_id);
        self
    }

    /// Accept a user's token and serve their profile without any room
    /// membership.
    #[must_use]
    pub fn with_user(mut self, user: &TestUser) -> Self {
        self.tokens.push((user.token(), user.id));
        self.directory = self.directory.with_profile(user.profile());
        self
    }

    /// Accept a user's token and put them on `room_id`'s member list, but
    /// serve no profile.
    #[must_use]
    pub fn with_profileless_member(mut self, user: &TestUser, room_id: &str) -> Self {
        self.tokens.push((user.token(), user.id));
        self.directory = self.directory.with_member(user.id, room_id);
        self
    }

    /// Replace the directory entirely (for failure-injection cases).
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn RoomDirectory>) -> Self {
        self.directory_override = Some(directory);
        self
    }

    /// Use the production `JwtVerifier` (keyed with [`TEST_JWT_SECRET`])
    /// instead of the static token table.
    #[must_use]
    pub fn with_jwt_verifier(mut self) -> Self {
        self.use_jwt_verifier = true;
        self
    }

    /// Set the room occupancy limit (default 10).
    #[must_use]
    pub fn with_max_room_size(mut self, limit: usize) -> Self {
        self.max_room_size = limit;
        self
    }

    /// Spawn the server on an ephemeral port.
    pub async fn spawn(self) -> Result<TestRelayServer, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                // Lazy pool target; port 1 never answers.
                "postgresql://sb:sb@127.0.0.1:1/unreachable".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("SB_JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
            (
                "SB_MAX_ROOM_SIZE".to_string(),
                self.max_room_size.to_string(),
            ),
        ]);
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            // Fail the readiness ping quickly; the default 30 s acquire
            // timeout collides with the router's request timeout.
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy(&config.database_url)
            .map_err(|e| anyhow::anyhow!("Failed to build lazy pool: {}", e))?;

        let verifier: Arc<dyn TokenVerifier> = if self.use_jwt_verifier {
            Arc::new(JwtVerifier::new(&SecretString::from(TEST_JWT_SECRET)))
        } else {
            let mut table = StaticTokenVerifier::new();
            for (token, user_id) in self.tokens {
                table = table.with_token(&token, user_id);
            }
            Arc::new(table)
        };
        let directory = self
            .directory_override
            .unwrap_or_else(|| Arc::new(self.directory) as Arc<dyn RoomDirectory>);

        let registry = Arc::new(RoomRegistry::new(config.max_room_size));
        let shutdown = CancellationToken::new();
        let state = Arc::new(AppState {
            pool,
            registry: Arc::clone(&registry),
            verifier,
            directory,
            shutdown: shutdown.clone(),
            config,
        });

        let app = routes::build_routes(state, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestRelayServer {
            addr,
            registry,
            shutdown,
            _handle: handle,
        })
    }
}

/// The `metrics` macros record into the process-global recorder, so tests
/// install exactly one and every spawned server renders from it.
fn test_metrics_handle() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("test metrics recorder installs once per process")
        })
        .clone()
}

impl TestRelayServer {
    /// Start configuring a server.
    pub fn builder() -> TestRelayServerBuilder {
        TestRelayServerBuilder {
            tokens: Vec::new(),
            directory: InMemoryDirectory::new(),
            directory_override: None,
            use_jwt_verifier: false,
            max_room_size: 10,
        }
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the WebSocket URL, with the given connection parameters attached
    /// when present.
    pub fn ws_url(&self, token: Option<&str>, room: Option<&str>) -> String {
        let mut url = format!("ws://{}/ws", self.addr);
        let mut separator = '?';
        if let Some(token) = token {
            url.push(separator);
            url.push_str("token=");
            url.push_str(token);
            separator = '&';
        }
        if let Some(room) = room {
            url.push(separator);
            url.push_str("room=");
            url.push_str(room);
        }
        url
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The server's live membership registry, for state assertions.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Trigger the server's drain signal, closing every live session.
    pub fn trigger_shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        // Abort the server task so the port frees up as soon as the test
        // completes.
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_and_serves_health() -> Result<(), anyhow::Error> {
        let server = TestRelayServer::builder().spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[tokio::test]
    async fn test_ws_url_attaches_present_params_only() -> Result<(), anyhow::Error> {
        let server = TestRelayServer::builder().spawn().await?;
        let base = format!("ws://{}/ws", server.addr());

        assert_eq!(server.ws_url(None, None), base);
        assert_eq!(
            server.ws_url(Some("tok"), None),
            format!("{base}?token=tok")
        );
        assert_eq!(server.ws_url(None, Some("r1")), format!("{base}?room=r1"));
        assert_eq!(
            server.ws_url(Some("tok"), Some("r1")),
            format!("{base}?token=tok&room=r1")
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_get_different_ports() -> Result<(), anyhow::Error> {
        let server1 = TestRelayServer::builder().spawn().await?;
        let server2 = TestRelayServer::builder().spawn().await?;

        assert_ne!(server1.addr(), server2.addr());

        Ok(())
    }
}
