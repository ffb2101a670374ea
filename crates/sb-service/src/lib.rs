//! Switchboard Relay Service Library
//!
//! This library provides the core functionality for Switchboard - a
//! room-presence and peer-signaling relay for small-mesh WebRTC sessions:
//!
//! - Connection admission (credential check, room membership, capacity)
//! - Room membership registry with presence fan-out
//! - Destination-addressed signaling relay (offer/answer/ICE)
//! - Operational endpoints (health, readiness, metrics)
//!
//! # Architecture
//!
//! Every client holds one WebSocket; all room state lives in the
//! [`registry::RoomRegistry`]:
//!
//! ```text
//! routes/mod.rs -> handlers/ws.rs -> admission.rs -> registry.rs
//!                                 \-> registry.rs (roster / status / relay)
//! ```
//!
//! The admission gates consult the external collaborators through the
//! [`auth::TokenVerifier`] and [`directory::RoomDirectory`] seams before the
//! registry commits the join.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error taxonomy with WebSocket close code mapping
//! - `protocol` - Wire envelope, closed client event set, payload shapes
//! - `registry` - Membership registry, presence fan-out, signal relay
//! - `admission` - Ordered admission gates
//! - `auth` - Credential verification
//! - `directory` - Membership and profile lookups
//! - `handlers` - HTTP and WebSocket handlers
//! - `routes` - Axum router setup

pub mod admission;
pub mod auth;
pub mod config;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod routes;
