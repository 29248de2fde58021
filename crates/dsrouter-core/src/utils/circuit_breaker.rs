//! Circuit Breaker pattern implementation
//!
//! Provides fault tolerance by excluding failing providers from selection.
//! The breaker has two observable states:
//! - Closed: calls allowed
//! - Open: `failure_threshold` consecutive failures seen, calls rejected
//!   until the cooldown elapses
//!
//! There is no separate half-open state. Once `open_until` has passed the
//! breaker reads as closed, and because the failure count is only cleared
//! by a success, the next call's outcome either reopens it immediately or
//! fully resets it.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures exceeded threshold - calls are short-circuited
    Open,
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set cooldown
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures recorded
    pub consecutive_failures: u32,
    /// Seconds until the breaker closes, when open
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Circuit breaker for one provider
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        match self.lock().open_until {
            Some(until) if Instant::now() < until => CircuitState::Open,
            _ => CircuitState::Closed,
        }
    }

    /// Get current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Check if the circuit allows a call
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.open_until.is_some() {
            info!(name = %self.name, "Circuit breaker closed");
        }
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        debug!(
            name = %self.name,
            failures = state.consecutive_failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        if state.consecutive_failures >= self.config.failure_threshold {
            let reopening = state.open_until.is_some();
            state.open_until = Some(Instant::now() + self.config.cooldown);
            if reopening {
                warn!(name = %self.name, "Circuit breaker probe failed, reopening");
            } else {
                warn!(
                    name = %self.name,
                    failures = state.consecutive_failures,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Circuit breaker opened"
                );
            }
        }
    }

    /// Snapshot for status reporting
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        let now = Instant::now();
        let retry_after_secs = state
            .open_until
            .filter(|until| now < *until)
            .map(|until| until.duration_since(now).as_secs());
        CircuitSnapshot {
            state: if retry_after_secs.is_some() {
                CircuitState::Open
            } else {
                CircuitState::Closed
            },
            consecutive_failures: state.consecutive_failures,
            retry_after_secs,
        }
    }
}

/// Breakers for every provider, created on first use
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for a provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(provider) {
            return breaker.clone();
        }
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.config.clone())))
            .clone()
    }

    /// Whether the provider's breaker is currently open
    #[must_use]
    pub fn is_open(&self, provider: &str) -> bool {
        self.breakers
            .get(provider)
            .map(|b| b.state() == CircuitState::Open)
            .unwrap_or(false)
    }
}
