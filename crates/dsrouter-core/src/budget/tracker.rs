use super::redis_store::RedisBudgetStore;
use super::store::{BudgetStore, MemoryBudgetStore, Usage};
use crate::config::{BudgetConfig, BudgetMode};
use crate::error::Result;
use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Snapshot of today's budget
///
/// Read fresh for every request; never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// Either cap reached
    pub exceeded: bool,
    /// Tokens used today
    pub tokens_used: u64,
    /// Daily token cap
    pub tokens_limit: u64,
    /// Dollars spent today
    pub usd_spent: f64,
    /// Daily dollar cap
    pub usd_limit: f64,
    /// Next UTC midnight
    pub next_reset_utc: DateTime<Utc>,
}

impl BudgetStatus {
    /// Build a status, deriving `exceeded` from the caps
    #[must_use]
    pub fn new(usage: Usage, config: &BudgetConfig, next_reset_utc: DateTime<Utc>) -> Self {
        let exceeded =
            usage.tokens >= config.daily_token_limit || usage.usd >= config.daily_usd_limit;
        Self {
            exceeded,
            tokens_used: usage.tokens,
            tokens_limit: config.daily_token_limit,
            usd_spent: usage.usd,
            usd_limit: config.daily_usd_limit,
            next_reset_utc,
        }
    }
}

/// Daily budget tracker
///
/// Uses the shared store when one is configured and falls back to a
/// process-local store while it is unreachable. Failures never block a
/// request.
pub struct BudgetTracker {
    config: BudgetConfig,
    shared: Option<Arc<dyn BudgetStore>>,
    local: MemoryBudgetStore,
    degraded: AtomicBool,
}

impl std::fmt::Debug for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetTracker")
            .field("config", &self.config)
            .field("shared", &self.shared.as_ref().map(|s| s.name()))
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

impl BudgetTracker {
    /// Create a tracker from config, using Redis when `redis_url` is set
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn new(config: BudgetConfig) -> Result<Self> {
        let shared: Option<Arc<dyn BudgetStore>> = match config.redis_url.as_deref() {
            Some(url) => Some(Arc::new(RedisBudgetStore::new(url)?)),
            None => None,
        };
        Ok(Self::build(config, shared))
    }

    /// Create a tracker with only the process-local store
    #[must_use]
    pub fn in_memory(config: BudgetConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a tracker over a specific shared store
    #[must_use]
    pub fn with_store(config: BudgetConfig, store: Arc<dyn BudgetStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: BudgetConfig, shared: Option<Arc<dyn BudgetStore>>) -> Self {
        Self {
            config,
            shared,
            local: MemoryBudgetStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Enforcement mode
    #[must_use]
    pub fn mode(&self) -> BudgetMode {
        self.config.mode
    }

    /// Whether the shared store was unreachable on the last access
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Store key for the UTC day containing `now`
    #[must_use]
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        format!("{}:{}", self.config.key_prefix, now.format("%Y-%m-%d"))
    }

    /// Current budget status
    #[instrument(skip(self))]
    pub async fn check_budget(&self) -> BudgetStatus {
        let now = Utc::now();
        let key = self.day_key(now);

        let usage = match &self.shared {
            Some(store) => match store.usage(&key).await {
                Ok(usage) => {
                    self.mark_healthy(store.name());
                    usage
                }
                Err(e) => {
                    self.mark_degraded(store.name(), &e.to_string());
                    self.local_usage(&key).await
                }
            },
            None => self.local_usage(&key).await,
        };

        let status = BudgetStatus::new(usage, &self.config, next_reset(now));
        debug!(
            tokens_used = status.tokens_used,
            usd_spent = status.usd_spent,
            exceeded = status.exceeded,
            "Budget checked"
        );
        status
    }

    /// Add completed usage to today's counters
    #[instrument(skip(self))]
    pub async fn record_usage(&self, tokens: u64, usd: f64) {
        let key = self.day_key(Utc::now());
        let ttl = Duration::from_secs(self.config.key_ttl_secs);

        if let Some(store) = &self.shared {
            match store.add_usage(&key, tokens, usd, ttl).await {
                Ok(()) => {
                    self.mark_healthy(store.name());
                    return;
                }
                Err(e) => self.mark_degraded(store.name(), &e.to_string()),
            }
        }

        if let Err(e) = self.local.add_usage(&key, tokens, usd, ttl).await {
            warn!(error = %e, "Local budget record failed");
        }
    }

    async fn local_usage(&self, key: &str) -> Usage {
        self.local.usage(key).await.unwrap_or_default()
    }

    fn mark_degraded(&self, store: &str, error: &str) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                store = %store,
                error = %error,
                "Budget store unreachable, falling back to process-local counters"
            );
        }
    }

    fn mark_healthy(&self, store: &str) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!(store = %store, "Budget store recovered");
        }
    }
}

/// Start of the next UTC day
#[must_use]
pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(now.date_naive());
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}
