//! Switchboard error types.
//!
//! Admission refusals map to WebSocket close codes sent to the client.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Switchboard error type.
///
/// Maps to WebSocket close codes:
/// - `MissingCredentials`: 4000
/// - `Unauthenticated`: 4001
/// - `NotAMember`: 4003
/// - `ProfileUnavailable`: 4004
/// - `RoomFull`: 4005
/// - Database, Config, Internal: 1011 (server error)
#[derive(Debug, Error)]
pub enum SbError {
    /// Connection request carried no credential or no room id.
    #[error("Missing credential or room id")]
    MissingCredentials,

    /// Credential verification failed (bad signature, expired, malformed subject).
    #[error("Credential verification failed: {0}")]
    Unauthenticated(String),

    /// Authenticated user is not a member of the requested room.
    #[error("User {user_id} is not a member of room {room_id}")]
    NotAMember { user_id: i64, room_id: String },

    /// No display profile exists for the authenticated user.
    #[error("No profile for user {0}")]
    ProfileUnavailable(i64),

    /// Room is at its configured occupancy limit.
    #[error("Room is full (limit {limit})")]
    RoomFull { limit: usize },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SbError {
    /// Returns the WebSocket close code sent when this error refuses a connection.
    ///
    /// Application codes live in the 4000-4999 private range; infrastructure
    /// failures use the standard 1011 "internal error" code.
    pub fn close_code(&self) -> u16 {
        match self {
            SbError::MissingCredentials => 4000,
            SbError::Unauthenticated(_) => 4001,
            SbError::NotAMember { .. } => 4003,
            SbError::ProfileUnavailable(_) => 4004,
            SbError::RoomFull { .. } => 4005,
            SbError::Database(_) | SbError::Config(_) | SbError::Internal(_) => 1011,
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    ///
    /// Uses enum variant names, not error message content, so label
    /// cardinality stays bounded.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            SbError::MissingCredentials => "missing_credentials",
            SbError::Unauthenticated(_) => "unauthenticated",
            SbError::NotAMember { .. } => "not_a_member",
            SbError::ProfileUnavailable(_) => "profile_unavailable",
            SbError::RoomFull { .. } => "room_full",
            SbError::Database(_) => "database",
            SbError::Config(_) => "config",
            SbError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe close reason (no internal details).
    pub fn client_message(&self) -> &'static str {
        match self {
            SbError::MissingCredentials => "Missing credential or room id",
            SbError::Unauthenticated(_) => "Invalid or expired credential",
            SbError::NotAMember { .. } => "Not a member of this room",
            SbError::ProfileUnavailable(_) => "Profile unavailable",
            SbError::RoomFull { .. } => "Room is full",
            SbError::Database(_) | SbError::Config(_) | SbError::Internal(_) => {
                "An internal error occurred"
            }
        }
    }
}
