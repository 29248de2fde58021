//! Generation request, response and stream chunk types
//!
//! These types flow through every stage of the pipeline. Stages never
//! mutate a request in place: the pre-guard produces a new sanitized copy
//! and the router derives per-attempt copies (for example with a CoT budget).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form metadata attached to requests, responses and chunks
pub type Metadata = HashMap<String, serde_json::Value>;

/// Generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenRequest {
    /// User prompt (required, non-empty)
    pub prompt: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Reasoning-token cap for reasoning-tier providers
    pub cot_budget: Option<u32>,
    /// Whether the caller asked for a stream
    pub stream: bool,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl GenRequest {
    /// Create a new request for a prompt
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set (or clear) the chain-of-thought budget
    #[must_use]
    pub fn with_cot_budget(mut self, cot_budget: Option<u32>) -> Self {
        self.cot_budget = cot_budget;
        self
    }

    /// Mark the request as streaming
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generation response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenResponse {
    /// Generated content
    pub content: String,
    /// Provider that produced the content
    pub provider: String,
    /// Prompt tokens consumed
    pub prompt_tokens: u32,
    /// Output tokens produced
    pub output_tokens: u32,
    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,
    /// Cost in USD
    pub cost_usd: f64,
    /// Reliability estimate in [0, 1]; `None` until assessed
    pub confidence: Option<f32>,
    /// Token log-probabilities, when the backend exposes them
    pub logprobs: Option<Vec<f32>>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Whether the content is a complete answer
    pub is_complete: bool,
}

impl GenResponse {
    /// Create a complete response with content from a provider
    #[must_use]
    pub fn new(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            is_complete: true,
            ..Default::default()
        }
    }

    /// Set token usage
    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u32, output_tokens: u32) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Set cost
    #[must_use]
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    /// Set confidence
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Total tokens (prompt + output)
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.output_tokens)
    }

    /// Read a boolean metadata flag (missing means false)
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// One fragment of a streamed response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Content fragment
    pub content: String,
    /// Position in the stream, starting at 0
    pub chunk_id: u64,
    /// Whether this is the terminal chunk
    pub is_final: bool,
    /// Provider that produced the fragment
    pub provider: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl StreamChunk {
    /// Create a non-final chunk with the given content
    #[must_use]
    pub fn new(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenRequest::new("Hello")
            .with_system_prompt("Be brief")
            .with_max_tokens(128)
            .with_cot_budget(Some(2000))
            .with_metadata("tenant", "acme");

        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.cot_budget, Some(2000));
        assert!(!request.stream);
        assert_eq!(request.metadata["tenant"], "acme");
    }

    #[test]
    fn test_response_defaults() {
        let response = GenResponse::new("fast", "Paris").with_usage(10, 5);
        assert!(response.is_complete);
        assert!(response.confidence.is_none());
        assert_eq!(response.total_tokens(), 15);
        assert!(!response.flag("escalated"));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(GenResponse::default().with_confidence(1.7).confidence, Some(1.0));
        assert_eq!(GenResponse::default().with_confidence(-0.2).confidence, Some(0.0));
    }
}
