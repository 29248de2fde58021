//! Router Facade
//!
//! [`DsRouter`] wires the guards, budget tracker, routing engine, breakers
//! and providers into two entry points:
//! - [`DsRouter::generate`]: one request, one response
//! - [`DsRouter::generate_stream`]: one request, a stream of chunks
//!
//! Neither entry point returns an error. Guard blocks, budget exhaustion and
//! provider failures all come back as ordinary responses (or a terminal
//! chunk) with the cause recorded in metadata.

mod generate;
mod streaming;

#[cfg(test)]
mod tests;

use crate::audit::{hash_input, AuditEntry, AuditSink, TracingAuditSink};
use crate::budget::{BudgetStatus, BudgetTracker};
use crate::cache::SemanticCache;
use crate::confidence::{ConfidenceScorer, HeuristicConfidenceScorer};
use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::rag::{MetadataRagScorer, RagScorer};
use crate::routing::{RoutingDecision, RoutingEngine, RoutingReason};
use crate::security::post_guard::{REDIRECT_CONFIDENCE, SAFETY_FILTER_PROVIDER};
use crate::security::{safe_redirect, GuardStatus, PostGuard, PreGuard, ToxicityScorer};
use crate::utils::{
    retry_with_backoff, BreakerRegistry, CircuitBreakerConfig, CircuitSnapshot, RetryConfig,
};
use chrono::Utc;
use dsrouter_llm::{GenRequest, GenResponse, HealthStatus, LlmProvider, TOKEN_COUNTER};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Provider name on budget-limit responses
pub const BUDGET_LIMITER_PROVIDER: &str = "budget_limiter";
/// Provider name on responses produced after every provider failed
pub const ULTIMATE_FALLBACK_PROVIDER: &str = "ultimate_fallback";

const DEGRADED_MESSAGE: &str = "I'm sorry, the service is running with degraded capability and could not complete this request. Please try again shortly.";

/// Health and breaker state of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Adapter-reported health
    pub health: HealthStatus,
    /// Breaker snapshot
    pub circuit: CircuitSnapshot,
    /// Whether the adapter streams natively
    pub streaming: bool,
}

/// Builder for [`DsRouter`]
pub struct DsRouterBuilder {
    config: RouterConfig,
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    budget: Option<BudgetTracker>,
    cache: Option<Arc<dyn SemanticCache>>,
    rag: Arc<dyn RagScorer>,
    audit: Arc<dyn AuditSink>,
    confidence: Arc<dyn ConfidenceScorer>,
    toxicity: Option<Arc<dyn ToxicityScorer>>,
}

impl DsRouterBuilder {
    /// Register a provider under its own name
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registering provider");
        self.providers.insert(name, provider);
        self
    }

    /// Use a specific budget tracker instead of one built from config
    #[must_use]
    pub fn with_budget_tracker(mut self, tracker: BudgetTracker) -> Self {
        self.budget = Some(tracker);
        self
    }

    /// Consult a semantic cache before routing
    #[must_use]
    pub fn with_semantic_cache(mut self, cache: Arc<dyn SemanticCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the RAG-support scorer
    #[must_use]
    pub fn with_rag_scorer(mut self, scorer: Arc<dyn RagScorer>) -> Self {
        self.rag = scorer;
        self
    }

    /// Replace the audit sink
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Replace the confidence scorer
    #[must_use]
    pub fn with_confidence_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.confidence = scorer;
        self
    }

    /// Replace the post-guard toxicity scorer
    #[must_use]
    pub fn with_toxicity_scorer(mut self, scorer: Arc<dyn ToxicityScorer>) -> Self {
        self.toxicity = Some(scorer);
        self
    }

    /// Validate configuration and build the router
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the budget store
    /// URL cannot be parsed
    pub fn build(self) -> Result<DsRouter> {
        self.config.validate()?;

        let budget = match self.budget {
            Some(tracker) => tracker,
            None => BudgetTracker::new(self.config.budget.clone())?,
        };
        let mut post_guard = PostGuard::new(self.config.post_guard.clone());
        if let Some(scorer) = self.toxicity {
            post_guard = post_guard.with_toxicity_scorer(scorer);
        }

        for tier in [
            &self.config.tiers.fast,
            &self.config.tiers.reasoning,
            &self.config.tiers.top,
            &self.config.tiers.local,
        ] {
            if !self.providers.contains_key(tier) {
                warn!(provider = %tier, "No provider registered for tier");
            }
        }

        info!(
            providers = self.providers.len(),
            budget_mode = ?budget.mode(),
            cache = self.cache.is_some(),
            "DS-Router initialized"
        );

        let core = RouterCore {
            routing: RoutingEngine::new(&self.config),
            breakers: BreakerRegistry::new(CircuitBreakerConfig::from(
                &self.config.circuit_breaker,
            )),
            retry: RetryConfig::from(&self.config.retry),
            pre_guard: PreGuard::new(),
            post_guard,
            providers: self.providers,
            budget,
            cache: self.cache,
            rag: self.rag,
            audit: self.audit,
            confidence: self.confidence,
            config: self.config,
        };
        Ok(DsRouter {
            core: Arc::new(core),
        })
    }
}

/// DS-Router facade
///
/// Cheap to clone; clones share breakers, budget and providers.
#[derive(Clone)]
pub struct DsRouter {
    core: Arc<RouterCore>,
}

impl std::fmt::Debug for DsRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&String> = self.core.providers.keys().collect();
        providers.sort();
        f.debug_struct("DsRouter")
            .field("providers", &providers)
            .field("budget", &self.core.budget)
            .finish_non_exhaustive()
    }
}

impl DsRouter {
    /// Start building a router
    #[must_use]
    pub fn builder(config: RouterConfig) -> DsRouterBuilder {
        DsRouterBuilder {
            config,
            providers: HashMap::new(),
            budget: None,
            cache: None,
            rag: Arc::new(MetadataRagScorer),
            audit: Arc::new(TracingAuditSink),
            confidence: Arc::new(HeuristicConfidenceScorer),
            toxicity: None,
        }
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.core.config
    }

    /// Routing engine in use
    #[must_use]
    pub fn routing(&self) -> &RoutingEngine {
        &self.core.routing
    }

    /// Pre-guard in use
    #[must_use]
    pub fn pre_guard(&self) -> &PreGuard {
        &self.core.pre_guard
    }

    /// Per-provider breakers
    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.core.breakers
    }

    /// Today's budget status
    pub async fn budget_status(&self) -> BudgetStatus {
        self.core.budget.check_budget().await
    }

    /// Health of every registered provider, checked concurrently
    pub async fn provider_status(&self) -> BTreeMap<String, ProviderStatus> {
        let checks = self.core.providers.iter().map(|(name, provider)| {
            let breaker = self.core.breakers.get(name);
            async move {
                let health = provider.health_check().await;
                let status = ProviderStatus {
                    health,
                    circuit: breaker.snapshot(),
                    streaming: provider.supports_streaming(),
                };
                (name.clone(), status)
            }
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }
}

/// Shared state behind the facade
pub(crate) struct RouterCore {
    config: RouterConfig,
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    routing: RoutingEngine,
    breakers: BreakerRegistry,
    retry: RetryConfig,
    pre_guard: PreGuard,
    post_guard: PostGuard,
    budget: BudgetTracker,
    cache: Option<Arc<dyn SemanticCache>>,
    rag: Arc<dyn RagScorer>,
    audit: Arc<dyn AuditSink>,
    confidence: Arc<dyn ConfidenceScorer>,
}

/// Per-request audit accumulator
struct Trail {
    request_id: String,
    input_hash: String,
    started: Instant,
    pre_guard: GuardStatus,
    post_guard: Option<GuardStatus>,
    routing_reason: Option<RoutingReason>,
    blocked: bool,
    escalated: bool,
    error_kind: Option<&'static str>,
    billed_prompt_tokens: u32,
    billed_output_tokens: u32,
    billed_usd: f64,
}

impl Trail {
    fn new(request_id: String, sanitized: &GenRequest, pre_guard: GuardStatus) -> Self {
        Self {
            request_id,
            input_hash: hash_input(&sanitized.prompt, sanitized.system_prompt.as_deref()),
            started: Instant::now(),
            pre_guard,
            post_guard: None,
            routing_reason: None,
            blocked: false,
            escalated: false,
            error_kind: None,
            billed_prompt_tokens: 0,
            billed_output_tokens: 0,
            billed_usd: 0.0,
        }
    }

    fn bill(&mut self, response: &GenResponse) {
        self.billed_prompt_tokens = self
            .billed_prompt_tokens
            .saturating_add(response.prompt_tokens);
        self.billed_output_tokens = self
            .billed_output_tokens
            .saturating_add(response.output_tokens);
        self.billed_usd += response.cost_usd;
    }

    fn billed_tokens(&self) -> u64 {
        u64::from(self.billed_prompt_tokens) + u64::from(self.billed_output_tokens)
    }

    fn entry(&self, response: &GenResponse) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            request_id: self.request_id.clone(),
            input_hash: self.input_hash.clone(),
            provider: response.provider.clone(),
            confidence: response.confidence,
            routing_reason: self.routing_reason.map(|r| r.as_str().to_string()),
            blocked: self.blocked,
            escalated: self.escalated,
            pre_guard_status: self.pre_guard,
            post_guard_status: self.post_guard,
            prompt_tokens: self.billed_prompt_tokens,
            output_tokens: self.billed_output_tokens,
            cost_usd: self.billed_usd,
            latency_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            error_kind: self.error_kind.map(str::to_string),
        }
    }
}

impl RouterCore {
    /// Call one provider through its breaker, with timeout and retries
    async fn call_provider(
        &self,
        decision: &RoutingDecision,
        request: &GenRequest,
    ) -> Result<GenResponse> {
        let name = decision.provider.as_str();
        let provider = self
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ProviderUnavailable(name.to_string()))?;
        let breaker = self.breakers.get(name);
        if !breaker.can_execute() {
            debug!(provider = %name, "Breaker open, call short-circuited");
            return Err(Error::ProviderUnavailable(name.to_string()));
        }

        let attempt_request = request.clone().with_cot_budget(decision.cot_budget);
        let timeout = self.config.timeouts.for_provider(name, &self.config.tiers);
        let started = Instant::now();

        let outcome = retry_with_backoff(
            &self.retry,
            || {
                let provider = Arc::clone(&provider);
                let request = attempt_request.clone();
                async move {
                    match tokio::time::timeout(timeout, provider.generate(&request)).await {
                        Ok(result) => result,
                        Err(_) => Err(dsrouter_llm::Error::Timeout(
                            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        )),
                    }
                }
            },
            dsrouter_llm::Error::is_retryable,
        )
        .await;

        match outcome {
            Ok(mut response) => {
                breaker.record_success();
                if response.latency_ms == 0 {
                    response.latency_ms =
                        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                }
                self.meter(&mut response, request);
                Ok(response)
            }
            Err(failure) => {
                if failure.last_error.is_retryable() {
                    breaker.record_failure();
                }
                warn!(
                    provider = %name,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Provider call failed"
                );
                if failure.last_error.is_timeout() {
                    Err(Error::ProviderTimeout {
                        provider: name.to_string(),
                        attempts: failure.attempts,
                    })
                } else {
                    Err(Error::Provider {
                        provider: name.to_string(),
                        source: failure.last_error,
                    })
                }
            }
        }
    }

    /// Fill in token counts and cost a provider left empty
    fn meter(&self, response: &mut GenResponse, request: &GenRequest) {
        if response.prompt_tokens == 0 {
            response.prompt_tokens = TOKEN_COUNTER
                .count_prompt_tokens(&request.prompt, request.system_prompt.as_deref());
        }
        if response.output_tokens == 0 {
            response.output_tokens = TOKEN_COUNTER.count_tokens(&response.content);
        }
        if response.cost_usd == 0.0 {
            response.cost_usd = self.config.pricing.estimate(
                &response.provider,
                response.prompt_tokens,
                response.output_tokens,
            );
        }
    }

    /// Decision for the local tier after `failed` gave up
    fn local_decision(&self, failed: &str, reasoning: RoutingReason) -> Option<RoutingDecision> {
        let local = &self.config.tiers.local;
        (failed != local.as_str()).then(|| RoutingDecision {
            provider: local.clone(),
            reasoning,
            cot_budget: None,
        })
    }

    /// Response returned when the pre-guard blocks
    fn refusal(&self, prompt: &str) -> GenResponse {
        GenResponse::new(SAFETY_FILTER_PROVIDER, safe_redirect(prompt))
            .with_confidence(REDIRECT_CONFIDENCE)
            .with_metadata("blocked", true)
            .with_metadata("pre_guard", GuardStatus::Blocked.as_str())
    }

    /// Response returned under hard budget enforcement
    fn budget_limited(&self, status: &BudgetStatus) -> GenResponse {
        let content = format!(
            "The daily usage limit has been reached ({} of {} tokens, ${:.2} of ${:.2}). Service resumes at {}.",
            status.tokens_used,
            status.tokens_limit,
            status.usd_spent,
            status.usd_limit,
            status.next_reset_utc.to_rfc3339(),
        );
        GenResponse::new(BUDGET_LIMITER_PROVIDER, content)
            .with_metadata("budget_exceeded", true)
            .with_metadata("next_reset_utc", status.next_reset_utc.to_rfc3339())
    }

    /// Response returned when every provider failed
    fn degraded(&self, failed: &str, error: &Error) -> GenResponse {
        let mut response = GenResponse::new(ULTIMATE_FALLBACK_PROVIDER, DEGRADED_MESSAGE)
            .with_confidence(0.0)
            .with_metadata("degraded", true)
            .with_metadata("fallback_from", failed)
            .with_metadata("fallback_reason", error.kind())
            .with_metadata("error_kind", Error::AllProvidersFailed.kind());
        response.is_complete = false;
        response
    }

    /// Hand an entry to the audit sink without waiting on it
    fn emit_audit(&self, entry: AuditEntry) {
        let sink = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(e) = sink.append(entry).await {
                warn!(error = %e, "Audit append failed");
            }
        });
    }
}
