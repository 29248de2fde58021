//! Semantic cache collaborator
//!
//! The router consults the cache after the pre-guard passes and before the
//! budget check. Running without a cache is the same as always missing.

use async_trait::async_trait;
use dsrouter_llm::GenResponse;
use std::time::Duration;

/// Metadata key set on responses served from the cache
pub const CACHE_HIT_KEY: &str = "cache_hit";

/// Response cache keyed by query meaning
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SemanticCache: Send + Sync {
    /// Look up a response for `query`, with `context` (the system prompt) as a qualifier
    async fn get(&self, query: &str, context: Option<String>) -> Option<GenResponse>;

    /// Store a response; returns whether it was stored
    async fn set(&self, query: &str, response: &GenResponse, ttl: Duration) -> bool;
}
