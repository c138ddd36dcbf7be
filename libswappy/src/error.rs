//! Error types for Swappy

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SwappyError>;

#[derive(Error, Debug)]
pub enum SwappyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SwappyError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SwappyError::InvalidInput(_) => 3,
            SwappyError::Auth(AuthError::InvalidInput(_)) => 3,
            SwappyError::Auth(_) => 2,
            SwappyError::Config(_) => 1,
            SwappyError::Storage(_) => 1,
        }
    }

    /// The auth-level view of this error, as published to session subscribers
    pub fn to_auth_error(&self) -> AuthError {
        match self {
            SwappyError::Auth(e) => e.clone(),
            SwappyError::Storage(e) => AuthError::Storage(e.to_string()),
            SwappyError::InvalidInput(msg) => AuthError::InvalidInput(msg.clone()),
            SwappyError::Config(e) => AuthError::Hosted(e.to_string()),
        }
    }
}

/// Fatal configuration problems. These abort startup.
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
pub enum StorageError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store contents are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Refusing to use '{0}': store file is a symbolic link")]
    Symlink(String),
}

/// Authentication failures surfaced through the session snapshot
///
/// Cloneable so the same error can be returned to the caller and published
/// to every subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Login cancelled")]
    Cancelled,

    #[error("Login window was dismissed before completing")]
    Dismissed,

    #[error("OAuth error: {code}{}", .description.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    Provider {
        code: String,
        description: Option<String>,
    },

    #[error("Invalid or expired one-time code: {0}")]
    InvalidCode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {}s waiting for the login round trip", .0.as_secs())]
    Timeout(Duration),

    #[error("Hosted auth service error: {0}")]
    Hosted(String),

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("No OAuth URL returned from the hosted auth service")]
    MissingAuthorizeUrl,
}

impl AuthError {
    /// User-level failures where the session is untouched and a retry is up
    /// to the user. Transient I/O failures return `false`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::Cancelled
                | AuthError::Dismissed
                | AuthError::Provider { .. }
                | AuthError::InvalidCode(_)
                | AuthError::InvalidInput(_)
                | AuthError::Timeout(_)
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = SwappyError::InvalidInput("mobile number".to_string());
        assert_eq!(error.exit_code(), 3);

        let error = SwappyError::Auth(AuthError::InvalidInput("code".to_string()));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = SwappyError::Auth(AuthError::Cancelled);
        assert_eq!(error.exit_code(), 2);

        let error = SwappyError::Auth(AuthError::Network("connection refused".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_config_and_storage() {
        let error = SwappyError::Config(ConfigError::MissingField("backend.url".to_string()));
        assert_eq!(error.exit_code(), 1);

        let error = SwappyError::Storage(StorageError::Symlink("/tmp/x".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_provider_error_formatting() {
        let error = AuthError::Provider {
            code: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(error.to_string(), "OAuth error: access_denied");

        let error = AuthError::Provider {
            code: "server_error".to_string(),
            description: Some("Unable to exchange external code".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "OAuth error: server_error (Unable to exchange external code)"
        );
    }

    #[test]
    fn test_timeout_formatting() {
        let error = AuthError::Timeout(Duration::from_secs(15));
        assert!(error.to_string().contains("15s"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(AuthError::Cancelled.is_recoverable());
        assert!(AuthError::Dismissed.is_recoverable());
        assert!(AuthError::InvalidCode("123456".to_string()).is_recoverable());
        assert!(AuthError::Provider {
            code: "access_denied".to_string(),
            description: None
        }
        .is_recoverable());

        assert!(!AuthError::Network("dns".to_string()).is_recoverable());
        assert!(!AuthError::Hosted("500".to_string()).is_recoverable());
        assert!(!AuthError::Storage("disk full".to_string()).is_recoverable());
    }

    #[test]
    fn test_storage_error_converts_to_auth_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let auth: AuthError = StorageError::Io(io).into();
        match auth {
            AuthError::Storage(msg) => assert!(msg.contains("denied")),
            other => panic!("Expected AuthError::Storage, got {:?}", other),
        }
    }

    #[test]
    fn test_to_auth_error_preserves_auth_variant() {
        let error = SwappyError::Auth(AuthError::Cancelled);
        assert_eq!(error.to_auth_error(), AuthError::Cancelled);

        let error = SwappyError::InvalidInput("bad".to_string());
        assert_eq!(error.to_auth_error(), AuthError::InvalidInput("bad".to_string()));
    }

    #[test]
    fn test_config_error_formatting() {
        let error = SwappyError::Config(ConfigError::MissingField(
            "SWAPPY_BACKEND_URL".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: SWAPPY_BACKEND_URL"
        );

        let error = ConfigError::InvalidValue {
            field: "auth.oauth_timeout".to_string(),
            reason: "expected a duration".to_string(),
        };
        assert!(error.to_string().contains("auth.oauth_timeout"));
    }
}
