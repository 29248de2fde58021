use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accumulated usage under one day key
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    /// Tokens consumed
    pub tokens: u64,
    /// Dollars spent
    pub usd: f64,
}

/// Store with atomic per-key increments and key expiry
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Atomically add usage to `key`, refreshing its TTL
    async fn add_usage(&self, key: &str, tokens: u64, usd: f64, ttl: Duration) -> Result<()>;

    /// Read usage under `key` (zero when absent)
    async fn usage(&self, key: &str) -> Result<Usage>;
}

#[derive(Debug, Default)]
struct Counters {
    tokens: AtomicU64,
    // f64 bits; 0 is 0.0
    usd_bits: AtomicU64,
}

impl Counters {
    fn add_usd(&self, usd: f64) {
        let _ = self
            .usd_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + usd).to_bits())
            });
    }

    fn usd(&self) -> f64 {
        f64::from_bits(self.usd_bits.load(Ordering::Acquire))
    }
}

/// Process-local store
///
/// Dollars are added with a compare-and-swap loop over the f64 bits, so
/// no increment is rounded away. Keys are per-day, so TTL is not enforced
/// here.
#[derive(Debug, Default)]
pub struct MemoryBudgetStore {
    counters: DashMap<String, Arc<Counters>>,
}

impl MemoryBudgetStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, key: &str) -> Arc<Counters> {
        if let Some(existing) = self.counters.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.counters.entry(key.to_string()).or_default().value())
    }
}

#[async_trait]
impl BudgetStore for MemoryBudgetStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_usage(&self, key: &str, tokens: u64, usd: f64, _ttl: Duration) -> Result<()> {
        let counters = self.counters(key);
        counters.tokens.fetch_add(tokens, Ordering::Relaxed);
        if usd > 0.0 {
            counters.add_usd(usd);
        }
        Ok(())
    }

    async fn usage(&self, key: &str) -> Result<Usage> {
        Ok(self
            .counters
            .get(key)
            .map(|counters| Usage {
                tokens: counters.tokens.load(Ordering::Relaxed),
                usd: counters.usd(),
            })
            .unwrap_or_default())
    }
}
