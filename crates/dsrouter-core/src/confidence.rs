//! Confidence assessment
//!
//! Scoring sits behind [`ConfidenceScorer`] so a learned model can replace
//! the phrase heuristic without touching the router.

use dsrouter_llm::GenResponse;
use regex::Regex;
use std::sync::LazyLock;

/// Score for hedged content
pub const HEDGED_CONFIDENCE: f32 = 0.3;
/// Score for assertive content
pub const ASSERTIVE_CONFIDENCE: f32 = 0.9;
/// Starting point for everything else
pub const BASELINE_CONFIDENCE: f32 = 0.6;

static HEDGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(not sure|might be|possibly|i think|perhaps|i'm uncertain|it's unclear|may or may not|i don't know)\b",
    )
    .expect("HEDGING is a compile-time constant")
});

static ASSERTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(definitively|certainly|precisely|without doubt|it is proven|q\.e\.d)\b")
        .expect("ASSERTIVE is a compile-time constant")
});

static CAUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(because|therefore|thus|hence|consequently)\b")
        .expect("CAUSAL is a compile-time constant")
});

/// Pluggable confidence estimate in `[0, 1]`
pub trait ConfidenceScorer: Send + Sync {
    /// Score response content
    fn score(&self, content: &str) -> f32;
}

/// Phrase-based confidence heuristic
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicConfidenceScorer;

impl ConfidenceScorer for HeuristicConfidenceScorer {
    fn score(&self, content: &str) -> f32 {
        if HEDGING.is_match(content) {
            return HEDGED_CONFIDENCE;
        }
        if ASSERTIVE.is_match(content) {
            return ASSERTIVE_CONFIDENCE;
        }

        let words = content.split_whitespace().count();
        let mut score = BASELINE_CONFIDENCE;
        if words > 50 {
            score += 0.1;
        }
        if CAUSAL.is_match(content) {
            score += 0.1;
        }
        if words < 10 {
            score -= 0.2;
        }
        score.clamp(0.0, 1.0)
    }
}

/// Confidence of a response: its own score if present, else the scorer's
#[must_use]
pub fn assess(scorer: &dyn ConfidenceScorer, response: &GenResponse) -> f32 {
    match response.confidence {
        Some(confidence) => confidence,
        None => scorer.score(&response.content),
    }
}
