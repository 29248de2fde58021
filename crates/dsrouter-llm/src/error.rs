//! Error types for dsrouter-llm

use thiserror::Error;

/// Provider error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error with the upstream HTTP status
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the backend
        status: u16,
        /// Backend error message
        message: String,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid or malformed response payload
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Provider has no native token streaming
    #[error("streaming not supported by provider: {0}")]
    StreamingUnsupported(String),

    /// The call was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a retry might succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient. Any other
    /// 4xx and malformed payloads are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimit => true,
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            Self::NotConfigured(_)
            | Self::InvalidResponse(_)
            | Self::StreamingUnsupported(_)
            | Self::Cancelled => false,
        }
    }

    /// Whether this error is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
