//! Guard verdict shared by the pre-guard and post-guard

use super::pii::PiiKind;
use super::post_guard::ViolationClass;
use super::pre_guard::RiskCategory;
use serde::Serialize;

/// Outcome class of a guard pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardStatus {
    /// Nothing changed
    Passed,
    /// Content was redacted
    Sanitized,
    /// Content was annotated
    Enhanced,
    /// Content was rejected
    Blocked,
}

impl GuardStatus {
    /// Stable lowercase tag
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Sanitized => "sanitized",
            Self::Enhanced => "enhanced",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a guard pass
///
/// `reason` is internal: it is logged and audited but never shown to users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardResult {
    /// Whether the payload was rejected
    pub blocked: bool,
    /// Machine-readable reason (empty when passed)
    pub reason: String,
    /// Outcome class
    pub status: GuardStatus,
    /// PII classes redacted (pre-guard)
    pub pii_redacted: Vec<PiiKind>,
    /// Risk categories flagged (pre-guard)
    pub risk_flags: Vec<RiskCategory>,
    /// Safety violation classes found (post-guard)
    pub violations: Vec<ViolationClass>,
    /// Toxicity estimate (post-guard)
    pub toxicity: Option<f32>,
}

impl GuardResult {
    /// A clean pass
    #[must_use]
    pub fn passed() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
            status: GuardStatus::Passed,
            pii_redacted: Vec::new(),
            risk_flags: Vec::new(),
            violations: Vec::new(),
            toxicity: None,
        }
    }

    /// A block with a reason
    #[must_use]
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: reason.into(),
            status: GuardStatus::Blocked,
            ..Self::passed()
        }
    }
}
