//! PII redaction
//!
//! Each match is replaced in place by `<REDACTED:TYPE>`. Classes run in a
//! fixed order (card numbers before phone numbers so a card is never
//! half-redacted as a phone). Redaction tokens contain no digits or `@`,
//! so redacting twice yields the same text.

use regex::{NoExpand, Regex};
use serde::Serialize;
use std::sync::LazyLock;

/// Class of personally identifiable information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    /// Email address
    Email,
    /// Credit-card-like digit group
    CreditCard,
    /// SSN-like number
    Ssn,
    /// Phone number
    Phone,
    /// Street address
    Address,
}

impl PiiKind {
    /// Every class, in redaction order
    pub const ALL: [PiiKind; 5] = [
        PiiKind::Email,
        PiiKind::CreditCard,
        PiiKind::Ssn,
        PiiKind::Phone,
        PiiKind::Address,
    ];

    /// Replacement token
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Self::Email => "<REDACTED:EMAIL>",
            Self::CreditCard => "<REDACTED:CREDIT_CARD>",
            Self::Ssn => "<REDACTED:SSN>",
            Self::Phone => "<REDACTED:PHONE>",
            Self::Address => "<REDACTED:ADDRESS>",
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Self::Email => &EMAIL_RE,
            Self::CreditCard => &CREDIT_CARD_RE,
            Self::Ssn => &SSN_RE,
            Self::Phone => &PHONE_RE,
            Self::Address => &ADDRESS_RE,
        }
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")
        .expect("EMAIL_RE is a compile-time constant")
});

static CREDIT_CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    // 13-19 digits, any grouping, single space or dash between groups
    Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("CREDIT_CARD_RE is a compile-time constant")
});

static SSN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("SSN_RE is a compile-time constant")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,2}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
        .expect("PHONE_RE is a compile-time constant")
});

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,5}\s+(?:[a-z0-9.]+\s+){1,4}(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|court|ct|way|place|pl)\b\.?",
    )
    .expect("ADDRESS_RE is a compile-time constant")
});

/// Redact every PII match, returning the new text and the classes found
#[must_use]
pub fn redact_pii(text: &str) -> (String, Vec<PiiKind>) {
    let mut redacted = text.to_string();
    let mut found = Vec::new();

    for kind in PiiKind::ALL {
        let regex = kind.regex();
        if regex.is_match(&redacted) {
            redacted = regex.replace_all(&redacted, NoExpand(kind.token())).into_owned();
            found.push(kind);
        }
    }

    (redacted, found)
}

/// Whether any PII class matches
#[must_use]
pub fn contains_pii(text: &str) -> bool {
    PiiKind::ALL.iter().any(|kind| kind.regex().is_match(text))
}
