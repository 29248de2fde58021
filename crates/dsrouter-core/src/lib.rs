//! DS-Router Core - LLM serving pipeline
//!
//! This crate provides the request path between a transport layer and a set
//! of LLM providers, including:
//! - Security: pre-guard (injection, PII, risk) and post-guard (safety, toxicity)
//! - Budget: per-UTC-day token and USD accounting with Redis or in-memory counters
//! - Routing: hard-problem detection and RAG-support thresholds
//! - Confidence: heuristic scoring and single-hop escalation
//! - Streaming: native or simulated chunk streams with one terminal chunk
//! - Router: the facade tying it together, with audit per request
//! - Utils: retry with backoff and per-provider circuit breakers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod budget;
pub mod cache;
pub mod confidence;
pub mod config;
pub mod error;
pub mod rag;
pub mod router;
pub mod routing;
pub mod security;
pub mod stream;
pub mod utils;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use budget::{BudgetStatus, BudgetStore, BudgetTracker, MemoryBudgetStore, RedisBudgetStore};
pub use cache::SemanticCache;
pub use confidence::{ConfidenceScorer, HeuristicConfidenceScorer};
pub use config::{BudgetMode, RouterConfig};
pub use error::{Error, Result};
pub use rag::{MetadataRagScorer, RagScorer};
pub use router::{
    DsRouter, DsRouterBuilder, ProviderStatus, BUDGET_LIMITER_PROVIDER, ULTIMATE_FALLBACK_PROVIDER,
};
pub use routing::{RoutingDecision, RoutingEngine, RoutingReason};
pub use security::{GuardResult, GuardStatus, PostGuard, PreGuard};
pub use stream::ChunkStream;
