//! Security Module - the guard sandwich around generation
//!
//! This module provides:
//! - Prompt injection detection
//! - PII redaction
//! - Pre-guard: injection, redaction and risk classification of prompts
//! - Post-guard: safety scan, toxicity scoring and claim annotation of output

pub mod guard;
pub mod injection;
pub mod pii;
pub mod post_guard;
pub mod pre_guard;

pub use guard::{GuardResult, GuardStatus};
pub use injection::{InjectionDetector, InjectionRule};
pub use pii::{redact_pii, PiiKind};
pub use post_guard::{
    safe_redirect, KeywordToxicityScorer, PostGuard, ToxicityScorer, ViolationClass,
};
pub use pre_guard::{PreGuard, RiskCategory, RiskLevel};
