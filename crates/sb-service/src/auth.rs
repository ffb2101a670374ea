//! Credential verification.
//!
//! Every connection presents a bearer credential at upgrade time. The
//! [`TokenVerifier`] seam turns it into a [`UserId`] or an admission
//! refusal; nothing downstream ever sees the raw credential.
//!
//! The production verifier checks an HS256 signature against the shared
//! secret from configuration. The `sub` claim carries the user id as a
//! decimal string and `exp` is required; any decode or claim failure is an
//! `Unauthenticated` refusal, with the detail kept server-side.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::errors::SbError;
use crate::protocol::UserId;

/// Trait for credential verification (enables mocking).
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a presented credential and return the user it identifies.
    async fn verify(&self, token: &str) -> Result<UserId, SbError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// HS256 shared-secret verifier.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &SecretString) -> Self {
        // Validation::new already requires and checks `exp`.
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait::async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, SbError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(target: "sb.auth", error = %e, "credential rejected");
            SbError::Unauthenticated(format!("token rejected: {e}"))
        })?;

        data.claims.sub.parse::<UserId>().map_err(|_| {
            tracing::debug!(target: "sb.auth", sub = %data.claims.sub, "subject is not a user id");
            SbError::Unauthenticated(format!("subject is not a user id: {:?}", data.claims.sub))
        })
    }
}

/// Mock verifier for testing (exposed for integration tests).
pub mod mock {
    use std::collections::HashMap;

    use super::{SbError, TokenVerifier, UserId};

    /// Verifier backed by a fixed token → user table.
    #[derive(Debug, Default)]
    pub struct StaticTokenVerifier {
        tokens: HashMap<String, UserId>,
    }

    impl StaticTokenVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` as identifying `user_id`.
        #[must_use]
        pub fn with_token(mut self, token: &str, user_id: UserId) -> Self {
            self.tokens.insert(token.to_string(), user_id);
            self
        }
    }

    #[async_trait::async_trait]
    impl TokenVerifier for StaticTokenVerifier {
        async fn verify(&self, token: &str) -> Result<UserId, SbError> {
            self.tokens
                .get(token)
                .copied()
                .ok_or_else(|| SbError::Unauthenticated("unknown test token".to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    fn secret() -> SecretString {
        SecretString::from("unit-test-secret")
    }

    fn mint(sub: &str, exp: i64, key: &str) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .expect("token encodes")
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_valid_token_yields_user_id() {
        let verifier = JwtVerifier::new(&secret());
        let token = mint("42", future_exp(), "unit-test-secret");

        let user_id = verifier.verify(&token).await.unwrap();
        assert_eq!(user_id, 42);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let verifier = JwtVerifier::new(&secret());
        let token = mint("42", future_exp(), "some-other-secret");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, SbError::Unauthenticated(_)));
        assert_eq!(err.close_code(), 4001);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let verifier = JwtVerifier::new(&secret());
        let token = mint("42", chrono::Utc::now().timestamp() - 3600, "unit-test-secret");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, SbError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_without_exp_is_rejected() {
        #[derive(Serialize)]
        struct NoExp {
            sub: String,
        }
        let token = encode(
            &Header::default(),
            &NoExp {
                sub: "42".to_string(),
            },
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        let verifier = JwtVerifier::new(&secret());
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, SbError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_subject_is_rejected() {
        let verifier = JwtVerifier::new(&secret());
        let token = mint("ada@example.com", future_exp(), "unit-test-secret");

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, SbError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_garbage_credential_is_rejected() {
        let verifier = JwtVerifier::new(&secret());

        let err = verifier.verify("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, SbError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_static_verifier_mock() {
        let verifier = mock::StaticTokenVerifier::new().with_token("tok-a", 7);

        assert_eq!(verifier.verify("tok-a").await.unwrap(), 7);
        assert!(verifier.verify("tok-b").await.is_err());
    }
}
