//! Error types for the gateway crate.

use thiserror::Error;

/// Result type alias using the gateway error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error type for provider calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// The provider answered with an empty body.
    #[error("No response from provider")]
    NoResponse,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            GatewayError::Network(format!("Connection failed: {}", err))
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

/// Check if an error is retryable.
///
/// Network errors and rate limit errors are retryable.
/// Config, auth, serialization, and provider errors are not.
pub fn is_retryable(error: &GatewayError) -> bool {
    error.is_retryable()
}
