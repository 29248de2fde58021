//! LLM Provider trait definition
//!
//! This module defines the capability contract that every generation
//! backend implements. Adapters must be safe for concurrent invocation.

use crate::error::{Error, Result};
use crate::request::{GenRequest, GenResponse, StreamChunk};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of raw chunks produced by a natively streaming provider.
///
/// Chunk ids and the final flag on these items are ignored by the router,
/// which renumbers every fragment it forwards.
pub type ProviderStream = BoxStream<'static, Result<StreamChunk>>;

/// Result of a provider health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Backend is reachable and serving
    Healthy,
    /// Backend answers but with reduced capability
    Degraded(String),
    /// Backend is not usable
    Unhealthy(String),
}

impl HealthStatus {
    /// Whether the backend can take traffic
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unhealthy(_))
    }
}

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Whether the provider streams tokens natively.
    ///
    /// Providers returning `false` are never asked for `generate_stream`;
    /// the router simulates chunking from a complete `generate` response.
    fn supports_streaming(&self) -> bool;

    /// Generate a complete response
    async fn generate(&self, request: &GenRequest) -> Result<GenResponse>;

    /// Generate a response as a stream of content fragments
    async fn generate_stream(&self, request: &GenRequest) -> Result<ProviderStream> {
        let _ = request;
        Err(Error::StreamingUnsupported(self.name().to_string()))
    }

    /// Check backend health
    async fn health_check(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider;

    #[async_trait::async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn supports_streaming(&self) -> bool {
            false
        }

        async fn generate(&self, _request: &GenRequest) -> Result<GenResponse> {
            Ok(GenResponse::new("static", "ok"))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Healthy
        }
    }

    #[tokio::test]
    async fn test_default_stream_is_unsupported() {
        let provider = StaticProvider;
        let result = provider.generate_stream(&GenRequest::new("hi")).await;
        assert!(matches!(result, Err(Error::StreamingUnsupported(name)) if name == "static"));
    }

    #[test]
    fn test_health_status_availability() {
        assert!(HealthStatus::Healthy.is_available());
        assert!(HealthStatus::Degraded("slow".into()).is_available());
        assert!(!HealthStatus::Unhealthy("down".into()).is_available());
    }
}
