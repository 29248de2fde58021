//! Utility modules for dsrouter-core
//!
//! Provides common utilities:
//! - retry: Retry logic with exponential backoff and jitter
//! - circuit_breaker: Per-provider circuit breakers and their registry

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
