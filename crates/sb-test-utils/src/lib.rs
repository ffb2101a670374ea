//! # Switchboard Test Utilities
//!
//! Shared test utilities for the Switchboard relay service.
//!
//! This crate provides:
//! - Server test harness (`TestRelayServer` for E2E tests)
//! - WebSocket test client (`RelayClient` speaking the wire envelope)
//! - Fixtures (`TestUser` builder, JWT minting, collaborator fakes)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sb_test_utils::{RelayClient, TestRelayServer, TestUser};
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let ada = TestUser::new(1).with_name("ada");
//!     let server = TestRelayServer::builder()
//!         .with_user_in_room(&ada, "r1")
//!         .spawn()
//!         .await?;
//!
//!     let mut client = RelayClient::connect(&server.ws_url(Some(&ada.token()), Some("r1"))).await?;
//!     let (event, _data) = client.next_event().await?;
//!     assert_eq!(event, "connected");
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod ws_client;

// Re-export commonly used items
pub use fixtures::{mint_jwt, TestUser, TEST_JWT_SECRET};
pub use server_harness::TestRelayServer;
pub use ws_client::RelayClient;
