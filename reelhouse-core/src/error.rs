//! Error types for Reelhouse operations
//!
//! Every error is `Clone`: one in-flight fetch may be awaited by several
//! requesters, and each of them receives its own copy of the outcome.

use thiserror::Error;

/// Session layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A remote call was attempted before the service handle was built.
    #[error("Remote service handle not ready")]
    HandleNotReady,

    #[error("Login failed: {reason}")]
    LoginFailed { reason: String },

    #[error("Login cancelled by user")]
    LoginCancelled,

    #[error("Credential store error: {reason}")]
    CredentialStore { reason: String },
}

/// Failures reported by, or on the way to, the backend service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    #[error("Transport error calling {operation}: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Could not decode {operation} response: {reason}")]
    Decode { operation: String, reason: String },
}

impl RemoteError {
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Name of the backend operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            Self::Rejected { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. } => operation,
        }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required parameter missing: {parameter}")]
    RequiredParameterMissing { parameter: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Cached value for {key} has an unexpected type")]
    TypeMismatch { key: String },

    #[error("Fetch task for {key} aborted: {reason}")]
    FetchAborted { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown resource in policy overrides: {name}")]
    UnknownResource { name: String },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Reelhouse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReelError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ReelError {
    /// True for failures that a read may retry (remote failures only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Result type alias for Reelhouse operations.
pub type ReelResult<T> = Result<T, ReelError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_rejected() {
        let err = RemoteError::rejected("uploadVideo", "Unauthorized: only channel owner");
        let msg = format!("{}", err);
        assert!(msg.contains("uploadVideo"));
        assert!(msg.contains("only channel owner"));
        assert_eq!(err.operation(), "uploadVideo");
    }

    #[test]
    fn test_session_error_display_not_ready() {
        let msg = format!("{}", SessionError::HandleNotReady);
        assert!(msg.contains("not ready"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "gateway_url".to_string(),
            value: "bad".to_string(),
            reason: "must be url".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("gateway_url"));
        assert!(msg.contains("bad"));
        assert!(msg.contains("must be url"));
    }

    #[test]
    fn test_reel_error_from_variants() {
        let session = ReelError::from(SessionError::HandleNotReady);
        assert!(matches!(session, ReelError::Session(_)));

        let remote = ReelError::from(RemoteError::rejected("getVideo", "boom"));
        assert!(matches!(remote, ReelError::Remote(_)));

        let validation = ReelError::from(ValidationError::RequiredParameterMissing {
            parameter: "video_id".to_string(),
        });
        assert!(matches!(validation, ReelError::Validation(_)));

        let cache = ReelError::from(CacheError::LockPoisoned);
        assert!(matches!(cache, ReelError::Cache(_)));

        let config = ReelError::from(ConfigError::MissingRequired {
            field: "gateway_url".to_string(),
        });
        assert!(matches!(config, ReelError::Config(_)));
    }

    #[test]
    fn test_only_remote_errors_are_retryable() {
        assert!(ReelError::from(RemoteError::rejected("getVideo", "x")).is_retryable());
        assert!(!ReelError::from(SessionError::HandleNotReady).is_retryable());
        assert!(!ReelError::from(CacheError::LockPoisoned).is_retryable());
    }
}
