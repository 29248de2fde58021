//! Router configuration types
//!
//! Every field has a default so partial TOML files and environment
//! overrides deserialize cleanly. Loading is left to the embedding
//! application; this module only defines and validates the surface.

use crate::error::{Error, Result};
use crate::utils::{CircuitBreakerConfig, RetryConfig};
use dsrouter_llm::PricingTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on the CoT budget handed to a single reasoning call
pub const REASONING_CALL_COT_CAP: u32 = 3000;

/// Top-level router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Confidence below which reasoning-tier answers are escalated
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    /// RAG support below which prompts go to the reasoning tier
    #[serde(default = "default_support_threshold")]
    pub support_threshold: f32,
    /// Configured chain-of-thought ceiling
    #[serde(default = "default_max_cot_tokens")]
    pub max_cot_tokens: u32,
    /// Seconds a cached response stays valid
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Provider names per tier
    #[serde(default)]
    pub tiers: TierConfig,
    /// Daily admission control
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Per-provider circuit breakers
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    /// Retries for transient provider errors
    #[serde(default)]
    pub retry: RetrySettings,
    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Streaming multiplexer settings
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Post-guard settings
    #[serde(default)]
    pub post_guard: PostGuardConfig,
    /// Per-provider pricing used when a backend reports no cost
    #[serde(default = "PricingTable::with_defaults")]
    pub pricing: PricingTable,
}

fn default_conf_threshold() -> f32 {
    0.7
}
fn default_support_threshold() -> f32 {
    0.5
}
fn default_max_cot_tokens() -> u32 {
    4096
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            conf_threshold: default_conf_threshold(),
            support_threshold: default_support_threshold(),
            max_cot_tokens: default_max_cot_tokens(),
            cache_ttl_secs: default_cache_ttl_secs(),
            tiers: TierConfig::default(),
            budget: BudgetConfig::default(),
            circuit_breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
            timeouts: TimeoutConfig::default(),
            streaming: StreamingConfig::default(),
            post_guard: PostGuardConfig::default(),
            pricing: PricingTable::with_defaults(),
        }
    }
}

impl RouterConfig {
    /// Check ranges and required names
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(Error::Config("conf_threshold must be within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.support_threshold) {
            return Err(Error::Config("support_threshold must be within [0, 1]".into()));
        }
        if self.max_cot_tokens == 0 {
            return Err(Error::Config("max_cot_tokens must be positive".into()));
        }
        for (field, name) in [
            ("tiers.fast", &self.tiers.fast),
            ("tiers.reasoning", &self.tiers.reasoning),
            ("tiers.top", &self.tiers.top),
            ("tiers.local", &self.tiers.local),
        ] {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("{field} must name a provider")));
            }
        }
        if self.budget.daily_token_limit == 0 {
            return Err(Error::Config("budget.daily_token_limit must be positive".into()));
        }
        if self.budget.daily_usd_limit <= 0.0 {
            return Err(Error::Config("budget.daily_usd_limit must be positive".into()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::Config(
                "circuit_breaker.failure_threshold must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be positive".into()));
        }
        if self.streaming.chunk_size == 0 || self.streaming.channel_capacity == 0 {
            return Err(Error::Config(
                "streaming.chunk_size and streaming.channel_capacity must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.post_guard.toxicity_threshold) {
            return Err(Error::Config(
                "post_guard.toxicity_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// CoT budget for one reasoning call
    #[must_use]
    pub fn reasoning_cot_budget(&self) -> u32 {
        self.max_cot_tokens.min(REASONING_CALL_COT_CAP)
    }
}

/// Provider names per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Fast/simple tier
    #[serde(default = "default_fast")]
    pub fast: String,
    /// Complex reasoning tier
    #[serde(default = "default_reasoning")]
    pub reasoning: String,
    /// Top reasoning tier (escalation target)
    #[serde(default = "default_top")]
    pub top: String,
    /// Local/offline fallback tier
    #[serde(default = "default_local")]
    pub local: String,
}

fn default_fast() -> String {
    "fast".to_string()
}
fn default_reasoning() -> String {
    "thinking".to_string()
}
fn default_top() -> String {
    "thinking_pro".to_string()
}
fn default_local() -> String {
    "local".to_string()
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            fast: default_fast(),
            reasoning: default_reasoning(),
            top: default_top(),
            local: default_local(),
        }
    }
}

impl TierConfig {
    /// Whether the provider belongs to a reasoning tier
    #[must_use]
    pub fn is_reasoning(&self, provider: &str) -> bool {
        provider == self.reasoning || provider == self.top
    }
}

/// Budget enforcement policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetMode {
    /// Refuse requests once the cap is exceeded
    #[default]
    Hard,
    /// Log only
    Warn,
}

/// Daily budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Tokens allowed per UTC day
    #[serde(default = "default_daily_token_limit")]
    pub daily_token_limit: u64,
    /// USD allowed per UTC day
    #[serde(default = "default_daily_usd_limit")]
    pub daily_usd_limit: f64,
    /// Enforcement policy
    #[serde(default)]
    pub mode: BudgetMode,
    /// Prefix for daily counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// TTL on daily keys so they expire after rollover
    #[serde(default = "default_key_ttl_secs")]
    pub key_ttl_secs: u64,
    /// Shared store; local memory when absent
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_daily_token_limit() -> u64 {
    1_000_000
}
fn default_daily_usd_limit() -> f64 {
    50.0
}
fn default_key_prefix() -> String {
    "dsrouter:budget".to_string()
}
fn default_key_ttl_secs() -> u64 {
    2 * 24 * 3600
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_token_limit: default_daily_token_limit(),
            daily_usd_limit: default_daily_usd_limit(),
            mode: BudgetMode::default(),
            key_prefix: default_key_prefix(),
            key_ttl_secs: default_key_ttl_secs(),
            redis_url: None,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the breaker stays open
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    300
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        CircuitBreakerConfig::new()
            .with_failure_threshold(settings.failure_threshold)
            .with_cooldown(Duration::from_secs(settings.cooldown_secs))
    }
}

/// Retry settings for transient provider errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per provider call, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay ceiling
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Exponential growth factor
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .with_max_attempts(settings.max_attempts)
            .with_initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
            .with_backoff_multiplier(settings.backoff_multiplier)
            .with_jitter(settings.jitter)
    }
}

/// Per-call timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for fast and local tier calls
    #[serde(default = "default_fast_ms")]
    pub fast_ms: u64,
    /// Timeout for reasoning tier calls
    #[serde(default = "default_reasoning_ms")]
    pub reasoning_ms: u64,
    /// Per-provider overrides
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

fn default_fast_ms() -> u64 {
    30_000
}
fn default_reasoning_ms() -> u64 {
    120_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fast_ms: default_fast_ms(),
            reasoning_ms: default_reasoning_ms(),
            overrides: HashMap::new(),
        }
    }
}

impl TimeoutConfig {
    /// Timeout for a provider call
    #[must_use]
    pub fn for_provider(&self, provider: &str, tiers: &TierConfig) -> Duration {
        let ms = self.overrides.get(provider).copied().unwrap_or_else(|| {
            if tiers.is_reasoning(provider) {
                self.reasoning_ms
            } else {
                self.fast_ms
            }
        });
        Duration::from_millis(ms)
    }
}

/// Streaming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Characters per simulated chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Delay between simulated chunks
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Bound of the per-stream chunk channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_chunk_size() -> usize {
    32
}
fn default_chunk_delay_ms() -> u64 {
    20
}
fn default_channel_capacity() -> usize {
    32
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Post-guard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostGuardConfig {
    /// Toxicity above which output is blocked
    #[serde(default = "default_toxicity_threshold")]
    pub toxicity_threshold: f32,
    /// Append a verification note to claim-bearing content
    #[serde(default = "default_true")]
    pub citation_notes: bool,
}

fn default_toxicity_threshold() -> f32 {
    0.7
}

impl Default for PostGuardConfig {
    fn default() -> Self {
        Self {
            toxicity_threshold: default_toxicity_threshold(),
            citation_notes: true,
        }
    }
}
