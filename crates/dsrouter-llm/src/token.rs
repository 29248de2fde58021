//! Token counting
//!
//! Uses tiktoken's cl100k_base encoding to estimate usage when a backend
//! does not report token counts (native streams usually do not).

use std::sync::LazyLock;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Global tokenizer instance (initialized once, thread-safe)
static TOKENIZER: LazyLock<CoreBPE> = LazyLock::new(|| {
    cl100k_base().expect("cl100k_base tokenizer is a compile-time constant and should never fail")
});

/// Token counter for estimating usage
///
/// This is a zero-cost wrapper around the global tokenizer instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    /// Create a new token counter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Count tokens in a string
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        u32::try_from(TOKENIZER.encode_with_special_tokens(text).len()).unwrap_or(u32::MAX)
    }

    /// Count prompt tokens for a request (system prompt included)
    #[must_use]
    pub fn count_prompt_tokens(&self, prompt: &str, system_prompt: Option<&str>) -> u32 {
        const MESSAGE_OVERHEAD: u32 = 6;
        let system = system_prompt
            .map(|s| self.count_tokens(s) + MESSAGE_OVERHEAD)
            .unwrap_or(0);
        self.count_tokens(prompt) + MESSAGE_OVERHEAD + system
    }
}

/// Global token counter instance
pub static TOKEN_COUNTER: TokenCounter = TokenCounter::new();

/// Convenience function to count tokens in text
#[must_use]
pub fn count_tokens(text: &str) -> u32 {
    TOKEN_COUNTER.count_tokens(text)
}
