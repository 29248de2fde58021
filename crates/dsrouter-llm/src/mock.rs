//! Mock LLM Provider for testing
//!
//! Returns scripted outcomes in order, then a default response once the
//! script is exhausted. Content is streamed word by word when native
//! streaming is enabled.

use crate::error::{Error, Result};
use crate::provider::{HealthStatus, LlmProvider, ProviderStream};
use crate::request::{GenRequest, GenResponse, StreamChunk};

use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted outcome for one call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Respond with this content
    Content(String),
    /// Respond with a fully specified response (provider name is overwritten)
    Response(GenResponse),
    /// Fail the call
    Error(Error),
    /// Stream `after` fragments, then fail (behaves like `Error` for `generate`)
    StreamError {
        /// Fragments delivered before the failure
        after: usize,
        /// Error raised mid-stream
        error: Error,
    },
}

/// A mock LLM provider that returns queued outcomes or a default response.
pub struct MockProvider {
    name: String,
    streaming: bool,
    default_content: String,
    default_confidence: Option<f32>,
    latency: Option<Duration>,
    health: HealthStatus,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    last_request: Mutex<Option<GenRequest>>,
    calls: AtomicU32,
}

impl MockProvider {
    /// Create a new mock provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            streaming: false,
            default_content: "mock response".to_string(),
            default_confidence: None,
            latency: None,
            health: HealthStatus::Healthy,
            outcomes: Mutex::new(VecDeque::new()),
            last_request: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// Set the content returned once the script is exhausted
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.default_content = content.into();
        self
    }

    /// Enable or disable native streaming
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Report this confidence on default responses
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.default_confidence = Some(confidence);
        self
    }

    /// Delay every call by this much
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Health check result
    #[must_use]
    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    /// Queue an outcome for the next call
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Number of generate/generate_stream calls received
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request received
    #[must_use]
    pub fn last_request(&self) -> Option<GenRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn begin_call(&self, request: &GenRequest) -> MockOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| MockOutcome::Content(self.default_content.clone()))
    }

    fn respond(&self, request: &GenRequest, content: String) -> GenResponse {
        let mut response = GenResponse::new(self.name.clone(), content).with_usage(
            word_count(&request.prompt),
            0,
        );
        response.output_tokens = word_count(&response.content);
        response.confidence = self.default_confidence;
        response
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

fn fragments(provider: &str, content: &str) -> Vec<StreamChunk> {
    content
        .split_inclusive(' ')
        .map(|piece| StreamChunk::new(provider, piece))
        .collect()
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn generate(&self, request: &GenRequest) -> Result<GenResponse> {
        match self.begin_call(request).await {
            MockOutcome::Content(content) => Ok(self.respond(request, content)),
            MockOutcome::Response(mut response) => {
                response.provider = self.name.clone();
                Ok(response)
            }
            MockOutcome::Error(error) | MockOutcome::StreamError { error, .. } => Err(error),
        }
    }

    async fn generate_stream(&self, request: &GenRequest) -> Result<ProviderStream> {
        if !self.streaming {
            return Err(Error::StreamingUnsupported(self.name.clone()));
        }

        match self.begin_call(request).await {
            MockOutcome::Content(content) => {
                let chunks = fragments(&self.name, &content);
                Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            MockOutcome::Response(response) => {
                let chunks = fragments(&self.name, &response.content);
                Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            MockOutcome::Error(error) => Err(error),
            MockOutcome::StreamError { after, error } => {
                let delivered: Vec<Result<StreamChunk>> =
                    fragments(&self.name, &self.default_content)
                        .into_iter()
                        .take(after)
                        .map(Ok)
                        .chain(std::iter::once(Err(error)))
                        .collect();
                Ok(stream::iter(delivered).boxed())
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        self.health.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_outcomes_then_default() {
        let provider = MockProvider::new("fast").with_content("default answer");
        provider.push_outcome(MockOutcome::Error(Error::Timeout(10)));
        provider.push_outcome(MockOutcome::Content("scripted".into()));

        let request = GenRequest::new("question");
        assert!(matches!(provider.generate(&request).await, Err(Error::Timeout(10))));
        assert_eq!(provider.generate(&request).await.unwrap().content, "scripted");
        assert_eq!(provider.generate(&request).await.unwrap().content, "default answer");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.last_request().unwrap().prompt, "question");
    }

    #[tokio::test]
    async fn test_native_stream_fragments() {
        let provider = MockProvider::new("fast")
            .with_streaming(true)
            .with_content("one two three");

        let stream = provider.generate_stream(&GenRequest::new("count")).await.unwrap();
        let pieces: Vec<String> = stream.map(|c| c.unwrap().content).collect().await;
        assert_eq!(pieces, vec!["one ", "two ", "three"]);
    }

    #[tokio::test]
    async fn test_stream_error_after_fragments() {
        let provider = MockProvider::new("fast")
            .with_streaming(true)
            .with_content("a b c d");
        provider.push_outcome(MockOutcome::StreamError {
            after: 2,
            error: Error::Network("reset".into()),
        });

        let stream = provider.generate_stream(&GenRequest::new("x")).await.unwrap();
        let items: Vec<Result<StreamChunk>> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(items[2], Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_non_streaming_mock_refuses_stream() {
        let provider = MockProvider::new("local");
        assert!(matches!(
            provider.generate_stream(&GenRequest::new("x")).await,
            Err(Error::StreamingUnsupported(_))
        ));
    }
}
