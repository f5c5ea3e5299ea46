//! Error types for the onboarding service.

use std::time::Duration;

use crate::onboarding::state::SessionStatus;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Snapshot store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Raw LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} rejected the request: {reason}")]
    BadRequest { provider: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Structured failure returned by the question oracle gateway.
///
/// Malformed oracle output is never reported here: it degrades to a
/// fallback question instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle authentication failed")]
    AuthFailure,

    #[error("Oracle rate limit exceeded")]
    RateLimited,

    #[error("Oracle rejected the request: {0}")]
    BadRequest(String),

    #[error("Oracle transport error: {0}")]
    Transport(String),

    #[error("Invalid oracle input: {0}")]
    InvalidInput(String),
}

impl OracleError {
    /// Short machine-readable label, used in telemetry events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::Transport(_) => "unknown_transport_error",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<LlmError> for OracleError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::AuthFailed { .. } => Self::AuthFailure,
            LlmError::RateLimited { .. } => Self::RateLimited,
            LlmError::BadRequest { reason, .. } => Self::BadRequest(reason),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Session-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is busy ({status}), try again once it is idle")]
    Busy { status: SessionStatus },

    #[error("Unknown quick pick: {0}")]
    UnknownQuickPick(String),

    #[error("Unknown track: {0}")]
    UnknownTrack(String),
}
