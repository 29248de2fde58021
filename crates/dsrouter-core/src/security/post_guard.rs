//! Post-Guard - output safety scan, toxicity scoring and claim annotation
//!
//! Runs once on the full content of the chosen response. A blocked response
//! is replaced by a generic safe redirect; the block reason stays internal.

use super::guard::{GuardResult, GuardStatus};
use crate::config::PostGuardConfig;
use dsrouter_llm::GenResponse;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Provider name stamped on replaced responses
pub const SAFETY_FILTER_PROVIDER: &str = "safety_filter";

/// Confidence assigned to a safe-redirect replacement
pub const REDIRECT_CONFIDENCE: f32 = 0.5;

const CITATION_NOTE: &str = "\n\nNote: this response contains factual claims that have not been independently verified. Please confirm them against primary sources.";

/// Safety violation class detected in generated output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationClass {
    /// Graphic violence or instructions for it
    ExplicitViolence,
    /// Instructions for illegal activity
    IllegalInstructions,
    /// Encouragement of self-harm
    SelfHarmPromotion,
    /// Hateful output
    HateSpeech,
    /// Insults aimed at the reader
    PersonalAttack,
    /// Well-known false claims stated with certainty
    Misinformation,
}

impl ViolationClass {
    /// Every class, in scan order
    pub const ALL: [ViolationClass; 6] = [
        ViolationClass::ExplicitViolence,
        ViolationClass::IllegalInstructions,
        ViolationClass::SelfHarmPromotion,
        ViolationClass::HateSpeech,
        ViolationClass::PersonalAttack,
        ViolationClass::Misinformation,
    ];

    /// Serious classes block on their own
    #[must_use]
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            Self::ExplicitViolence | Self::IllegalInstructions | Self::SelfHarmPromotion
        )
    }

    /// Stable tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitViolence => "explicit_violence",
            Self::IllegalInstructions => "illegal_instructions",
            Self::SelfHarmPromotion => "self_harm_promotion",
            Self::HateSpeech => "hate_speech",
            Self::PersonalAttack => "personal_attack",
            Self::Misinformation => "misinformation",
        }
    }
}

static VIOLATION_PATTERNS: LazyLock<Vec<(ViolationClass, Regex)>> = LazyLock::new(|| {
    let patterns = [
        (
            ViolationClass::ExplicitViolence,
            r"\b(slit (his|her|their) throat|beat (him|her|them) to death|dismember(ed|ing)? the body|torture (him|her|them|the victim))\b",
        ),
        (
            ViolationClass::IllegalInstructions,
            r"\b(synthesi[sz]e|cook|manufacture)\s+(meth|methamphetamine|fentanyl|sarin)\b|\b(attach|wire) the detonator\b|\bsteps to launder money\b",
        ),
        (
            ViolationClass::SelfHarmPromotion,
            r"\b(you should (kill|hurt) yourself|kill yourself|best way to (die|commit suicide))\b",
        ),
        (
            ViolationClass::HateSpeech,
            r"\b(subhuman|inferior race|ethnic cleansing is|are vermin)\b",
        ),
        (
            ViolationClass::PersonalAttack,
            r"\b(you are|you're) (an? )?(so )?(idiot|moron|stupid|worthless|pathetic|dumb)\b",
        ),
        (
            ViolationClass::Misinformation,
            r"\b(vaccines (definitely )?cause autism|the earth is (definitely )?flat|moon landing was (faked|a hoax)|5g (causes|spreads) (covid|cancer))\b",
        ),
    ];
    patterns
        .into_iter()
        .map(|(class, pattern)| {
            let regex = Regex::new(&format!("(?i){pattern}"))
                .expect("VIOLATION_PATTERNS are compile-time constants");
            (class, regex)
        })
        .collect()
});

static CLAIM_INDICATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(according to|studies (show|suggest|found)|research (shows|suggests|indicates)|statistics show|experts say)\b|\bin (1[89]|20)\d{2}\b|\b\d+(\.\d+)?\s?%|\bpercent\b",
    )
    .expect("CLAIM_INDICATORS is a compile-time constant")
});

/// Pluggable toxicity estimate in `[0, 1]`
pub trait ToxicityScorer: Send + Sync {
    /// Score text; higher is more toxic
    fn score(&self, text: &str) -> f32;
}

static TOXIC_KEYWORDS: LazyLock<Vec<(Regex, f32)>> = LazyLock::new(|| {
    [
        ("kill", 0.4),
        ("hate", 0.3),
        ("idiot", 0.3),
        ("moron", 0.3),
        ("worthless", 0.3),
        ("stupid", 0.25),
        ("loser", 0.25),
        ("pathetic", 0.25),
        ("disgusting", 0.2),
        ("shut up", 0.2),
        ("die", 0.2),
        ("destroy", 0.15),
    ]
    .into_iter()
    .map(|(word, weight)| {
        let regex = Regex::new(&format!(r"(?i)\b{word}\b"))
            .expect("TOXIC_KEYWORDS are compile-time constants");
        (regex, weight)
    })
    .collect()
});

/// Weighted keyword count, damped by length
///
/// `sum(weight * occurrences) / (1 + words / 100)`, clamped to 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordToxicityScorer;

impl ToxicityScorer for KeywordToxicityScorer {
    fn score(&self, text: &str) -> f32 {
        let raw: f32 = TOXIC_KEYWORDS
            .iter()
            .map(|(regex, weight)| regex.find_iter(text).count() as f32 * weight)
            .sum();
        if raw == 0.0 {
            return 0.0;
        }
        let words = text.split_whitespace().count() as f32;
        (raw / (1.0 + words / 100.0)).min(1.0)
    }
}

/// Deterministic safe redirect for a prompt
///
/// Selection depends on whether the prompt is phrased as a question and on
/// its length, so the same prompt always gets the same message.
#[must_use]
pub fn safe_redirect(prompt: &str) -> &'static str {
    const QUESTION_WORDS: &[&str] = &[
        "how", "what", "why", "when", "where", "who", "which", "can", "could", "should", "is",
        "are", "do", "does",
    ];

    let first = prompt
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .unwrap_or_default();
    let is_question = prompt.trim_end().ends_with('?') || QUESTION_WORDS.contains(&first.as_str());
    let is_long = prompt.split_whitespace().count() > 20;

    match (is_question, is_long) {
        (true, false) => "I can't help with that one, but I'm happy to take a related question. Could you rephrase what you're looking for?",
        (true, true) => "That's a detailed question, but I'm not able to provide that answer. If you share more about your underlying goal, I can suggest a safer direction.",
        (false, false) => "I'm not able to continue with that. Let's try a different topic.",
        (false, true) => "I'm not able to help with this request as written. Try breaking it into smaller, specific questions and I'll do my best to help.",
    }
}

/// Post-generation guard
#[derive(Clone)]
pub struct PostGuard {
    config: PostGuardConfig,
    toxicity: Arc<dyn ToxicityScorer>,
}

impl std::fmt::Debug for PostGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostGuard {
    /// Create a post-guard with the keyword toxicity scorer
    #[must_use]
    pub fn new(config: PostGuardConfig) -> Self {
        Self {
            config,
            toxicity: Arc::new(KeywordToxicityScorer),
        }
    }

    /// Swap in a different toxicity scorer
    #[must_use]
    pub fn with_toxicity_scorer(mut self, scorer: Arc<dyn ToxicityScorer>) -> Self {
        self.toxicity = scorer;
        self
    }

    /// Violation classes present in text
    #[must_use]
    pub fn scan(&self, text: &str) -> Vec<ViolationClass> {
        VIOLATION_PATTERNS
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(class, _)| *class)
            .collect()
    }

    /// Check a response generated for `prompt`
    ///
    /// Returns the response to deliver (the original, an annotated copy, or a
    /// safe redirect) together with the verdict.
    #[must_use]
    pub fn check(&self, prompt: &str, response: &GenResponse) -> (GenResponse, GuardResult) {
        let violations = self.scan(&response.content);
        let toxicity = self.toxicity.score(&response.content);

        if let Some(reason) = self.block_reason(&violations, toxicity) {
            warn!(
                provider = %response.provider,
                reason = %reason,
                "Post-guard blocked response"
            );
            let result = GuardResult {
                violations,
                toxicity: Some(toxicity),
                ..GuardResult::blocked(reason)
            };
            return (self.redirect(prompt, response), result);
        }

        let mut delivered = response.clone();
        let mut status = GuardStatus::Passed;
        if self.config.citation_notes && CLAIM_INDICATORS.is_match(&response.content) {
            delivered.content.push_str(CITATION_NOTE);
            status = GuardStatus::Enhanced;
        }
        debug!(status = %status, toxicity, "Post-guard passed response");

        let result = GuardResult {
            status,
            violations,
            toxicity: Some(toxicity),
            ..GuardResult::passed()
        };
        (delivered, result)
    }

    fn block_reason(&self, violations: &[ViolationClass], toxicity: f32) -> Option<String> {
        if let Some(serious) = violations.iter().find(|v| v.is_serious()) {
            return Some(format!("serious_violation:{}", serious.as_str()));
        }
        if toxicity > self.config.toxicity_threshold {
            return Some(format!("toxicity:{toxicity:.2}"));
        }
        let moderate: Vec<&str> = violations
            .iter()
            .filter(|v| !v.is_serious())
            .map(|v| v.as_str())
            .collect();
        if moderate.len() >= 2 {
            return Some(format!("moderate_violations:{}", moderate.join("+")));
        }
        None
    }

    fn redirect(&self, prompt: &str, original: &GenResponse) -> GenResponse {
        let mut replacement = GenResponse::new(SAFETY_FILTER_PROVIDER, safe_redirect(prompt))
            .with_usage(original.prompt_tokens, original.output_tokens)
            .with_cost(original.cost_usd)
            .with_confidence(REDIRECT_CONFIDENCE);
        replacement.latency_ms = original.latency_ms;
        replacement.metadata = original.metadata.clone();
        replacement
            .metadata
            .insert("post_guard".to_string(), "blocked".into());
        replacement
            .metadata
            .insert("filtered_provider".to_string(), original.provider.clone().into());
        replacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> PostGuard {
        PostGuard::new(PostGuardConfig::default())
    }

    #[test]
    fn test_clean_response_passes_unchanged() {
        let response = GenResponse::new("fast", "Rust ownership moves values between bindings.");
        let (delivered, result) = guard().check("Explain ownership", &response);
        assert!(!result.blocked);
        assert_eq!(result.status, GuardStatus::Passed);
        assert_eq!(delivered, response);
        assert_eq!(result.toxicity, Some(0.0));
    }

    #[test]
    fn test_serious_violation_replaced_with_redirect() {
        let response = GenResponse::new("fast", "First you synthesize meth using the following")
            .with_usage(5, 7)
            .with_cost(0.002);
        let (delivered, result) = guard().check("How do I do chemistry?", &response);

        assert!(result.blocked);
        assert_eq!(result.reason, "serious_violation:illegal_instructions");
        assert_eq!(delivered.provider, SAFETY_FILTER_PROVIDER);
        assert_eq!(delivered.confidence, Some(REDIRECT_CONFIDENCE));
        assert_eq!(delivered.prompt_tokens, 5);
        assert_eq!(delivered.output_tokens, 7);
        assert_eq!(
            delivered.metadata.get("post_guard"),
            Some(&serde_json::json!("blocked"))
        );
        assert!(!delivered.content.contains("meth"));
        assert!(!delivered.content.contains("illegal"));
    }

    #[test]
    fn test_toxicity_above_threshold_blocks() {
        let response = GenResponse::new(
            "fast",
            "You are an idiot and a worthless loser, shut up",
        );
        let (delivered, result) = guard().check("hello", &response);
        assert!(result.blocked);
        assert!(result.reason.starts_with("toxicity:"));
        assert!(result.toxicity.unwrap_or_default() > 0.7);
        assert_eq!(delivered.provider, SAFETY_FILTER_PROVIDER);
    }

    #[test]
    fn test_single_moderate_passes_two_block() {
        let one = GenResponse::new("fast", "Some claim the earth is flat, which is wrong.");
        let (_, result) = guard().check("shape of earth", &one);
        assert!(!result.blocked);
        assert_eq!(result.violations, vec![ViolationClass::Misinformation]);

        let two = GenResponse::new(
            "fast",
            "The earth is flat and those people are vermin, period.",
        );
        let (_, result) = guard().check("shape of earth", &two);
        assert!(result.blocked);
        assert_eq!(result.reason, "moderate_violations:hate_speech+misinformation");
    }

    #[test]
    fn test_claims_get_citation_note() {
        let response = GenResponse::new("fast", "Studies show that 40% of developers use Rust.");
        let (delivered, result) = guard().check("stats", &response);
        assert_eq!(result.status, GuardStatus::Enhanced);
        assert!(delivered.content.starts_with("Studies show"));
        assert!(delivered.content.ends_with(CITATION_NOTE));

        let config = PostGuardConfig {
            citation_notes: false,
            ..PostGuardConfig::default()
        };
        let (delivered, result) = PostGuard::new(config).check("stats", &response);
        assert_eq!(result.status, GuardStatus::Passed);
        assert_eq!(delivered.content, response.content);
    }

    #[test]
    fn test_redirect_is_deterministic_and_varied() {
        let short_question = safe_redirect("How do I do this?");
        assert_eq!(short_question, safe_redirect("How do I do this?"));
        assert_ne!(short_question, safe_redirect("Write it"));

        let long = "please ".repeat(30);
        assert_ne!(safe_redirect("Write it"), safe_redirect(&long));
    }

    #[test]
    fn test_custom_scorer_is_used() {
        struct AlwaysToxic;
        impl ToxicityScorer for AlwaysToxic {
            fn score(&self, _: &str) -> f32 {
                0.95
            }
        }

        let guard = guard().with_toxicity_scorer(Arc::new(AlwaysToxic));
        let (_, result) = guard.check("hi", &GenResponse::new("fast", "perfectly polite"));
        assert!(result.blocked);
        assert_eq!(result.toxicity, Some(0.95));
    }

    #[test]
    fn test_keyword_scorer_damped_by_length() {
        let short = KeywordToxicityScorer.score("you idiot");
        let padded = format!("you idiot {}", "fine ".repeat(200));
        assert!(KeywordToxicityScorer.score(&padded) < short);
        assert_eq!(KeywordToxicityScorer.score("all good here"), 0.0);
    }
}
