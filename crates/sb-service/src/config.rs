use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Reference room occupancy limit when `SB_MAX_ROOM_SIZE` is unset.
///
/// Full-mesh peer sessions degrade quickly past this size, so the default
/// is deliberately small.
pub const DEFAULT_MAX_ROOM_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: SecretString,
    pub max_room_size: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),

    #[error("Invalid room size limit: {0}")]
    InvalidRoomSize(String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8090".to_string());

        let jwt_secret = vars
            .get("SB_JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("SB_JWT_SECRET".to_string()))?;

        if jwt_secret.is_empty() {
            return Err(ConfigError::InvalidJwtSecret(
                "SB_JWT_SECRET must not be empty".to_string(),
            ));
        }

        let max_room_size = match vars.get("SB_MAX_ROOM_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidRoomSize(format!("{raw:?}: {e}")))?,
            None => DEFAULT_MAX_ROOM_SIZE,
        };

        if max_room_size == 0 {
            return Err(ConfigError::InvalidRoomSize(
                "SB_MAX_ROOM_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            database_url,
            bind_address,
            jwt_secret: SecretString::from(jwt_secret.clone()),
            max_room_size,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn required_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/test".to_string(),
            ),
            ("SB_JWT_SECRET".to_string(), "test-signing-secret".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success() {
        let mut vars = required_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("SB_MAX_ROOM_SIZE".to_string(), "4".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/test");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwt_secret.expose_secret(), "test-signing-secret");
        assert_eq!(config.max_room_size, 4);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let mut vars = required_vars();
        vars.remove("DATABASE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let mut vars = required_vars();
        vars.remove("SB_JWT_SECRET");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SB_JWT_SECRET"));
    }

    #[test]
    fn test_from_vars_empty_jwt_secret() {
        let mut vars = required_vars();
        vars.insert("SB_JWT_SECRET".to_string(), String::new());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidJwtSecret(_))));
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&required_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, "0.0.0.0:8090");
        assert_eq!(config.max_room_size, DEFAULT_MAX_ROOM_SIZE);
    }

    #[test]
    fn test_from_vars_room_size_not_a_number() {
        let mut vars = required_vars();
        vars.insert("SB_MAX_ROOM_SIZE".to_string(), "ten".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidRoomSize(msg)) if msg.contains("ten")));
    }

    #[test]
    fn test_from_vars_room_size_zero() {
        let mut vars = required_vars();
        vars.insert("SB_MAX_ROOM_SIZE".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRoomSize(msg)) if msg.contains("at least 1"))
        );
    }

    #[test]
    fn test_from_vars_room_size_one_is_allowed() {
        let mut vars = required_vars();
        vars.insert("SB_MAX_ROOM_SIZE".to_string(), "1".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.max_room_size, 1);
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let config = Config::from_vars(&required_vars()).expect("Config should load successfully");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("test-signing-secret"));
    }
}
