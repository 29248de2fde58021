use super::{DsRouter, RouterCore, Trail};
use crate::cache::CACHE_HIT_KEY;
use crate::config::BudgetMode;
use crate::confidence::assess;
use crate::error::Error;
use crate::routing::RoutingDecision;
use dsrouter_llm::{GenRequest, GenResponse};
use std::time::Duration;
use tracing::{info, instrument, warn, Span};
use uuid::Uuid;

impl DsRouter {
    /// Generate a response
    ///
    /// Pre-guard, cache, budget check, routing, provider call (breaker,
    /// timeout, retries), confidence, escalation, post-guard, budget record
    /// and audit, in that order. Never fails: every outcome is a response.
    #[instrument(skip(self, request), fields(request_id))]
    pub async fn generate(&self, request: GenRequest) -> GenResponse {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", request_id.as_str());
        self.core.generate(request, request_id).await
    }
}

impl RouterCore {
    async fn generate(&self, request: GenRequest, request_id: String) -> GenResponse {
        let (sanitized, pre) = self.pre_guard.check(&request);
        let mut trail = Trail::new(request_id, &sanitized, pre.status);

        if pre.blocked {
            trail.blocked = true;
            trail.error_kind = Some(Error::BlockedByPreGuard(pre.reason).kind());
            let response = self.refusal(&sanitized.prompt);
            return self.complete(trail, response);
        }

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache
                .get(&sanitized.prompt, sanitized.system_prompt.clone())
                .await
            {
                info!(provider = %cached.provider, "Semantic cache hit");
                let response = cached.with_metadata(CACHE_HIT_KEY, true);
                return self.complete(trail, response);
            }
        }

        let budget = self.budget.check_budget().await;
        if budget.exceeded {
            match self.budget.mode() {
                BudgetMode::Hard => {
                    warn!(
                        tokens_used = budget.tokens_used,
                        usd_spent = budget.usd_spent,
                        "Daily budget exceeded, request refused"
                    );
                    trail.blocked = true;
                    trail.error_kind = Some(Error::BudgetExceeded.kind());
                    let response = self.budget_limited(&budget);
                    return self.complete(trail, response);
                }
                BudgetMode::Warn => warn!(
                    tokens_used = budget.tokens_used,
                    usd_spent = budget.usd_spent,
                    "Daily budget exceeded, continuing in warn mode"
                ),
            }
        }

        let rag_score = self.rag.score(&sanitized);
        let initial = self.routing.decide(&sanitized.prompt, rag_score);
        trail.routing_reason = Some(initial.reasoning);

        let (decision, outcome) = match self.routing.reselect(initial.clone(), &self.breakers) {
            Ok(decision) => {
                let outcome = self.call_provider(&decision, &sanitized).await;
                (decision, outcome)
            }
            Err(e) => (initial, Err(e)),
        };

        let mut response = match outcome {
            Ok(response) => {
                trail.bill(&response);
                self.assess_and_escalate(response, &decision, &sanitized, &mut trail)
                    .await
            }
            Err(e) => self.fall_back(&decision, e, &sanitized, &mut trail).await,
        };

        let (delivered, post) = self.post_guard.check(&sanitized.prompt, &response);
        trail.post_guard = Some(post.status);
        if post.blocked {
            trail.blocked = true;
            trail.error_kind = Some(Error::BlockedByPostGuard(post.reason).kind());
        }
        response = delivered;
        if let Some(reason) = trail.routing_reason {
            response = response.with_metadata("routing_reason", reason.as_str());
        }

        if trail.billed_tokens() > 0 || trail.billed_usd > 0.0 {
            self.budget
                .record_usage(trail.billed_tokens(), trail.billed_usd)
                .await;
        }

        if let Some(cache) = &self.cache {
            if trail.error_kind.is_none() {
                let ttl = Duration::from_secs(self.config.cache_ttl_secs);
                if !cache.set(&sanitized.prompt, &response, ttl).await {
                    warn!("Semantic cache rejected response");
                }
            }
        }

        self.complete(trail, response)
    }

    /// Score confidence and take the single escalation hop if warranted
    async fn assess_and_escalate(
        &self,
        mut response: GenResponse,
        decision: &RoutingDecision,
        request: &GenRequest,
        trail: &mut Trail,
    ) -> GenResponse {
        let confidence = assess(self.confidence.as_ref(), &response);
        response.confidence = Some(confidence);

        if !self.routing.should_escalate(&decision.provider, confidence) {
            return response;
        }

        let hop = self.routing.escalation();
        info!(
            from = %decision.provider,
            to = %hop.provider,
            confidence,
            "Low confidence, escalating"
        );

        match self.call_provider(&hop, request).await {
            Ok(mut escalated) => {
                trail.bill(&escalated);
                trail.escalated = true;
                trail.routing_reason = Some(hop.reasoning);
                let confidence = assess(self.confidence.as_ref(), &escalated);
                escalated.confidence = Some(confidence);
                escalated
                    .with_metadata("escalated", true)
                    .with_metadata("escalation_reason", "low_confidence")
                    .with_metadata("escalated_from", decision.provider.as_str())
            }
            Err(e) => {
                warn!(error = %e, "Escalation failed, keeping original response");
                response.with_metadata("escalation_failed", e.kind())
            }
        }
    }

    /// Try the local tier, then give up with a degraded-capability response
    async fn fall_back(
        &self,
        decision: &RoutingDecision,
        error: Error,
        request: &GenRequest,
        trail: &mut Trail,
    ) -> GenResponse {
        trail.error_kind = Some(error.kind());

        if let Some(local) = self.local_decision(&decision.provider, decision.reasoning) {
            match self.call_provider(&local, request).await {
                Ok(mut response) => {
                    info!(
                        from = %decision.provider,
                        to = %local.provider,
                        reason = error.kind(),
                        "Fell back to local provider"
                    );
                    trail.bill(&response);
                    response.confidence = Some(assess(self.confidence.as_ref(), &response));
                    return response
                        .with_metadata("fallback_from", decision.provider.as_str())
                        .with_metadata("fallback_reason", error.kind());
                }
                Err(local_error) => {
                    warn!(error = %local_error, "Local fallback failed");
                }
            }
        }

        trail.error_kind = Some(Error::AllProvidersFailed.kind());
        self.degraded(&decision.provider, &error)
    }

    /// Stamp request metadata, emit the audit entry and return
    fn complete(&self, trail: Trail, response: GenResponse) -> GenResponse {
        let response = response.with_metadata("request_id", trail.request_id.as_str());
        self.emit_audit(trail.entry(&response));
        response
    }
}
