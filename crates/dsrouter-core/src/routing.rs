//! Routing engine
//!
//! [`RoutingEngine::decide`] is a pure function of prompt, RAG-support score
//! and config. Breaker state is applied afterwards by
//! [`RoutingEngine::reselect`], which walks the fallback order for the
//! chosen tier and skips providers whose breaker is open.

use crate::config::{RouterConfig, TierConfig};
use crate::error::{Error, Result};
use crate::utils::BreakerRegistry;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Why a provider was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// Fast tier, no chain-of-thought
    SimpleQuery,
    /// Reasoning tier with a CoT budget
    ComplexQuery,
    /// Single hop to the top tier after a low-confidence answer
    LowConfidenceEscalation,
}

impl RoutingReason {
    /// Stable tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleQuery => "simple_query",
            Self::ComplexQuery => "complex_query",
            Self::LowConfidenceEscalation => "low_confidence_escalation",
        }
    }
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider choice for one attempt
///
/// Built fresh for every attempt; escalation creates a new decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Chosen provider name
    pub provider: String,
    /// Reason tag
    pub reasoning: RoutingReason,
    /// Chain-of-thought budget for reasoning-tier calls
    pub cot_budget: Option<u32>,
}

/// Hard-problem pattern family
#[derive(Debug)]
struct ProblemFamily {
    name: &'static str,
    regex: Regex,
}

static HARD_PROBLEM_FAMILIES: LazyLock<Vec<ProblemFamily>> = LazyLock::new(|| {
    let families = [
        (
            "proof",
            r"\b(prove|proof|derive|derivation|show that|demonstrate that)\b",
        ),
        (
            "complexity",
            r"\b(time complexity|space complexity|big[- ]o|optimi[sz]e|optimi[sz]ation|np[- ](hard|complete)|asymptotic)\b|\bo\(\s*(n|log n|n log n|n\^?2|2\^n)\s*\)",
        ),
        (
            "debugging",
            r"\b(debug|stack trace|segfault|segmentation fault|race condition|deadlock|memory leak|why does (this|my) code)\b",
        ),
        (
            "formal_logic",
            r"\b(theorem|lemma|corollary|if and only if|iff|by contradiction|by induction|axiom|tautology)\b",
        ),
        (
            "math_notation",
            r"[∑∫∀∃√∂≤≥≠∞]|\\(frac|sum|int|forall|exists)\b|\b\d+\s*\^\s*\d+\b|\b(integral|derivative|eigenvalues?|differential equation)\b",
        ),
    ];
    families
        .into_iter()
        .map(|(name, pattern)| ProblemFamily {
            name,
            regex: Regex::new(&format!("(?i){pattern}"))
                .expect("HARD_PROBLEM_FAMILIES are compile-time constants"),
        })
        .collect()
});

/// Chooses providers from prompt shape and RAG support
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    tiers: TierConfig,
    support_threshold: f32,
    conf_threshold: f32,
    cot_budget: u32,
}

impl RoutingEngine {
    /// Create an engine from router configuration
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
            support_threshold: config.support_threshold,
            conf_threshold: config.conf_threshold,
            cot_budget: config.reasoning_cot_budget(),
        }
    }

    /// Tier names in use
    #[must_use]
    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    /// Name of the first hard-problem family the prompt matches
    #[must_use]
    pub fn hard_problem_family(&self, prompt: &str) -> Option<&'static str> {
        HARD_PROBLEM_FAMILIES
            .iter()
            .find(|family| family.regex.is_match(prompt))
            .map(|family| family.name)
    }

    /// Whether the prompt matches any hard-problem family
    #[must_use]
    pub fn is_hard_problem(&self, prompt: &str) -> bool {
        self.hard_problem_family(prompt).is_some()
    }

    /// Initial decision, independent of provider health
    #[must_use]
    pub fn decide(&self, prompt: &str, rag_score: f32) -> RoutingDecision {
        let family = self.hard_problem_family(prompt);
        let low_support = rag_score < self.support_threshold;

        let decision = if family.is_some() || low_support {
            RoutingDecision {
                provider: self.tiers.reasoning.clone(),
                reasoning: RoutingReason::ComplexQuery,
                cot_budget: Some(self.cot_budget),
            }
        } else {
            RoutingDecision {
                provider: self.tiers.fast.clone(),
                reasoning: RoutingReason::SimpleQuery,
                cot_budget: None,
            }
        };

        debug!(
            provider = %decision.provider,
            reasoning = %decision.reasoning,
            hard_problem = family.unwrap_or("none"),
            rag_score,
            "Routing decision"
        );
        decision
    }

    /// Apply breaker state, moving to the next healthy tier if needed
    ///
    /// Reasoning falls back to top, fast, local; fast falls back to
    /// reasoning, top, local. Returns `ProviderUnavailable` when every
    /// candidate is open.
    pub fn reselect(
        &self,
        decision: RoutingDecision,
        breakers: &BreakerRegistry,
    ) -> Result<RoutingDecision> {
        if !breakers.is_open(&decision.provider) {
            return Ok(decision);
        }

        let candidates = if decision.provider == self.tiers.fast {
            [&self.tiers.reasoning, &self.tiers.top, &self.tiers.local]
        } else {
            [&self.tiers.top, &self.tiers.fast, &self.tiers.local]
        };

        let replacement = candidates
            .into_iter()
            .filter(|candidate| **candidate != decision.provider)
            .find(|candidate| !breakers.is_open(candidate))
            .ok_or_else(|| Error::ProviderUnavailable(decision.provider.clone()))?;

        info!(
            from = %decision.provider,
            to = %replacement,
            "Breaker open, reselecting provider"
        );

        let cot_budget = if self.tiers.is_reasoning(replacement) {
            Some(self.cot_budget)
        } else {
            None
        };
        Ok(RoutingDecision {
            provider: replacement.clone(),
            reasoning: decision.reasoning,
            cot_budget,
        })
    }

    /// Whether a response from `provider` with `confidence` earns an escalation
    #[must_use]
    pub fn should_escalate(&self, provider: &str, confidence: f32) -> bool {
        provider == self.tiers.reasoning && confidence < self.conf_threshold
    }

    /// The single escalation hop
    #[must_use]
    pub fn escalation(&self) -> RoutingDecision {
        RoutingDecision {
            provider: self.tiers.top.clone(),
            reasoning: RoutingReason::LowConfidenceEscalation,
            cot_budget: Some(self.cot_budget),
        }
    }
}
