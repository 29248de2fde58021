//! Error types for dsrouter-core
//!
//! The facade never raises these to its caller: every failure is folded
//! into a response (or a terminal chunk) and only `Error::kind()` is
//! written into response metadata.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Pre-guard rejected the prompt
    #[error("blocked by pre-guard: {0}")]
    BlockedByPreGuard(String),

    /// Post-guard rejected the generated content
    #[error("blocked by post-guard: {0}")]
    BlockedByPostGuard(String),

    /// Daily budget exhausted under hard enforcement
    #[error("daily budget exceeded")]
    BudgetExceeded,

    /// Provider call timed out after all retries
    #[error("provider {provider} timed out after {attempts} attempts")]
    ProviderTimeout {
        /// Provider name
        provider: String,
        /// Attempts made
        attempts: u32,
    },

    /// Provider breaker is open (or provider is not registered)
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider call failed after all retries
    #[error("provider {provider} failed: {source}")]
    Provider {
        /// Provider name
        provider: String,
        /// Last provider error
        #[source]
        source: dsrouter_llm::Error,
    },

    /// Every candidate including the local fallback failed
    #[error("all providers failed")]
    AllProvidersFailed,

    /// Stream consumer went away
    #[error("stream cancelled")]
    StreamCancelled,

    /// Upstream provider failed while streaming
    #[error("stream upstream failure: {0}")]
    StreamUpstreamFailure(String),

    /// Budget store failure (Redis, serialization)
    #[error("budget store error: {0}")]
    BudgetStore(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable tag used in response metadata and audit entries
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockedByPreGuard(_) => "blocked_by_pre_guard",
            Self::BlockedByPostGuard(_) => "blocked_by_post_guard",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Provider { .. } => "provider_error",
            Self::AllProvidersFailed => "all_providers_failed",
            Self::StreamCancelled => "stream_cancelled",
            Self::StreamUpstreamFailure(_) => "stream_upstream_failure",
            Self::BudgetStore(_) => "budget_store",
            Self::Config(_) => "config",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
