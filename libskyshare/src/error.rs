//! Error types for Skyshare

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkyshareError>;

#[derive(Error, Debug)]
pub enum SkyshareError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Bluesky API error: {0}")]
    Api(#[from] ApiError),

    /// Missing domain, identifier, token or DID. A valid steady state, not a fault.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SkyshareError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SkyshareError::InvalidInput(_) => 3,
            SkyshareError::Api(ApiError::Authentication(_)) => 2,
            SkyshareError::Api(_) => 1,
            SkyshareError::NotConfigured(_) => 1,
            SkyshareError::Config(_) => 1,
            SkyshareError::Database(_) => 1,
        }
    }

    /// True for the "not configured" steady state
    pub fn is_not_configured(&self) -> bool {
        matches!(self, SkyshareError::NotConfigured(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Failures talking to the remote XRPC endpoints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Login or refresh rejected, or a bearer token refused
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network failure or a non-authentication HTTP failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body missing expected fields or not JSON
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SkyshareError::InvalidInput("bsky.social".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = SkyshareError::Api(ApiError::Authentication("ExpiredToken".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let transport = SkyshareError::Api(ApiError::Transport("connection refused".to_string()));
        assert_eq!(transport.exit_code(), 1);

        let malformed =
            SkyshareError::Api(ApiError::MalformedResponse("missing did".to_string()));
        assert_eq!(malformed.exit_code(), 1);

        let not_configured = SkyshareError::NotConfigured("no access token".to_string());
        assert_eq!(not_configured.exit_code(), 1);

        let config = SkyshareError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = SkyshareError::Api(ApiError::Authentication(
            "createSession returned 401".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Bluesky API error: Authentication failed: createSession returned 401"
        );

        let error = SkyshareError::NotConfigured("missing did".to_string());
        assert_eq!(error.to_string(), "Not configured: missing did");

        let config_error = ConfigError::InvalidValue {
            field: "scheduling.refresh_interval".to_string(),
            reason: "expected a duration".to_string(),
        };
        assert_eq!(
            config_error.to_string(),
            "Invalid value for scheduling.refresh_interval: expected a duration"
        );
    }

    #[test]
    fn test_is_not_configured() {
        assert!(SkyshareError::NotConfigured("x".into()).is_not_configured());
        assert!(!SkyshareError::InvalidInput("x".into()).is_not_configured());
    }

    #[test]
    fn test_error_conversion_from_api_error() {
        let api_error = ApiError::Transport("timeout".to_string());
        let error: SkyshareError = api_error.into();

        match error {
            SkyshareError::Api(ApiError::Transport(msg)) => assert_eq!(msg, "timeout"),
            _ => panic!("Expected SkyshareError::Api"),
        }
    }
}
