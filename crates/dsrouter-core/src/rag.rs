//! RAG-support scoring collaborator

use dsrouter_llm::GenRequest;

/// Request metadata key that carries a precomputed support score
pub const RAG_SCORE_KEY: &str = "rag_support_score";

/// Estimates how well retrieved context supports a request, in `[0, 1]`
#[cfg_attr(test, mockall::automock)]
pub trait RagScorer: Send + Sync {
    /// Score a request
    fn score(&self, request: &GenRequest) -> f32;
}

/// Reads `rag_support_score` from request metadata, defaulting to full support
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataRagScorer;

impl RagScorer for MetadataRagScorer {
    fn score(&self, request: &GenRequest) -> f32 {
        request
            .metadata
            .get(RAG_SCORE_KEY)
            .and_then(serde_json::Value::as_f64)
            .map_or(1.0, |score| (score as f32).clamp(0.0, 1.0))
    }
}
