//! Pre-configured test data fixtures for relay testing.
//!
//! Provides builders and helpers for:
//! - Users with display profiles and static test tokens
//! - HS256 JWT minting for the real credential verifier
//!
//! The collaborator fakes themselves (`StaticTokenVerifier`,
//! `InMemoryDirectory`) live in `sb-service`'s mock modules and are
//! re-exported here so test files have a single import surface.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use sb_service::protocol::{Profile, UserId};

pub use sb_service::auth::mock::StaticTokenVerifier;
pub use sb_service::directory::mock::InMemoryDirectory;

/// Shared secret the harness configures when tests exercise the real
/// `JwtVerifier` instead of the static token table.
pub const TEST_JWT_SECRET: &str = "sb-test-signing-secret";

/// Test user fixture.
#[derive(Debug, Clone)]
pub struct TestUser {
    /// User ID as carried in credentials and the profile store.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Opaque profile blob, if any.
    pub profile: Option<serde_json::Value>,
}

impl TestUser {
    /// Create a test user with derived name and email.
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            name: format!("user-{id}"),
            email: format!("user-{id}@example.com"),
            profile: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the contact email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Attach an opaque profile blob.
    #[must_use]
    pub fn with_profile_blob(mut self, blob: serde_json::Value) -> Self {
        self.profile = Some(blob);
        self
    }

    /// The static credential the harness verifier accepts for this user.
    pub fn token(&self) -> String {
        format!("tok-{}", self.id)
    }

    /// The display profile the harness directory serves for this user.
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            profile: self.profile.clone(),
            created_at: None,
        }
    }
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

/// Mint an HS256 JWT signed with [`TEST_JWT_SECRET`].
///
/// `expires_in_secs` may be negative to mint an already-expired token.
pub fn mint_jwt(sub: &str, expires_in_secs: i64) -> String {
    encode(
        &Header::default(),
        &TestClaims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + expires_in_secs,
        },
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("test token encodes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults_derive_from_id() {
        let user = TestUser::new(7);
        assert_eq!(user.name, "user-7");
        assert_eq!(user.email, "user-7@example.com");
        assert_eq!(user.token(), "tok-7");
        assert_eq!(user.profile().id, 7);
    }

    #[test]
    fn test_user_builder_overrides() {
        let user = TestUser::new(1)
            .with_name("ada")
            .with_email("ada@example.com")
            .with_profile_blob(serde_json::json!({"avatar": "a.png"}));

        let profile = user.profile();
        assert_eq!(profile.name, "ada");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.profile.unwrap()["avatar"], "a.png");
    }

    #[test]
    fn test_mint_jwt_produces_three_segments() {
        let token = mint_jwt("42", 3600);
        assert_eq!(token.split('.').count(), 3);
    }
}
