//! Prompt Injection Detection
//!
//! A fixed, ordered list of pattern rules. The first matching rule wins and
//! its id becomes the block reason (`prompt_injection:<rule-id>`).

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// A rule that indicates a prompt injection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionRule {
    /// Rule identifier
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Case-insensitive regular expression
    pub pattern: &'static str,
}

/// Known injection rules, in evaluation order
pub const INJECTION_RULES: &[InjectionRule] = &[
    // Instruction override
    InjectionRule {
        id: "instruction_override",
        description: "Attempt to discard previous instructions",
        pattern: r"\b(ignore|disregard|forget|override|bypass)\b[\w\s,]{0,24}\b(previous|prior|above|earlier|preceding|your|all)\b[\w\s]{0,16}\b(instructions?|rules|prompts?|directives|guidelines)\b",
    },
    InjectionRule {
        id: "system_prompt_extraction",
        description: "Attempt to extract the system prompt",
        pattern: r"\b(reveal|show|print|repeat|output|leak|tell me)\b[\w\s]{0,24}\b(system prompt|hidden instructions|initial instructions)\b",
    },
    // Role confusion
    InjectionRule {
        id: "role_confusion",
        description: "Attempt to reassign the assistant's role",
        pattern: r"\b(you are now|from now on,? you are|from now on,? act as|pretend (to be|you are)|your new (identity|role) is)\b",
    },
    InjectionRule {
        id: "jailbreak_mode",
        description: "Known jailbreak persona or mode switch",
        pattern: r"\b(dan mode|developer mode|jailbreak mode|do anything now)\b",
    },
    InjectionRule {
        id: "role_marker",
        description: "Forged conversation role marker",
        pattern: r"(?m)^\s*(system|assistant)\s*:|<\|im_start\|>|\[/?inst\]",
    },
    // Embedded script/markup
    InjectionRule {
        id: "embedded_markup",
        description: "Embedded script or active markup",
        pattern: r"<\s*/?\s*(script|iframe|object|embed)\b|javascript:|\bon(load|error|click)\s*=",
    },
    // Tool-invocation bait
    InjectionRule {
        id: "tool_invocation_bait",
        description: "Attempt to trigger tool or function execution",
        pattern: r"<\s*/?\s*(tool_call|function_call|tool_use)\s*>|\b(call|invoke|execute|trigger|use)\s+(the\s+)?(\w+\s+)?tool\s+(with|to|and)\b",
    },
];

static COMPILED_RULES: LazyLock<Vec<(InjectionRule, Regex)>> = LazyLock::new(|| {
    INJECTION_RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(&format!("(?i){}", rule.pattern))
                .expect("INJECTION_RULES are compile-time constants");
            (*rule, regex)
        })
        .collect()
});

/// Detector for prompt injection attacks
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionDetector;

impl InjectionDetector {
    /// Create a detector over the built-in rules
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// First rule matching the input, in rule order
    #[must_use]
    pub fn detect(&self, input: &str) -> Option<&'static InjectionRule> {
        let hit = INJECTION_RULES
            .iter()
            .zip(COMPILED_RULES.iter())
            .find(|(_, (_, regex))| regex.is_match(input))
            .map(|(rule, _)| rule);

        if let Some(rule) = hit {
            warn!(rule = %rule.id, "Injection pattern detected");
        }
        hit
    }

    /// Every rule matching the input
    #[must_use]
    pub fn detect_all(&self, input: &str) -> Vec<&'static str> {
        COMPILED_RULES
            .iter()
            .filter(|(_, regex)| regex.is_match(input))
            .map(|(rule, _)| rule.id)
            .collect()
    }
}
