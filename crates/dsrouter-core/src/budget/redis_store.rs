use super::store::{BudgetStore, Usage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const TOKENS_FIELD: &str = "tokens";
const USD_FIELD: &str = "usd";

/// Redis-backed budget store (shared across instances)
///
/// Each day is one hash with `tokens` and `usd` fields, updated with
/// `HINCRBY`/`HINCRBYFLOAT` in a `MULTI` block together with `EXPIRE`.
pub struct RedisBudgetStore {
    client: redis::Client,
}

impl RedisBudgetStore {
    /// Create a store for a Redis URL
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::BudgetStore(format!("invalid Redis URL: {e}")))?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::BudgetStore(format!("Redis connection failed: {e}")))
    }
}

#[async_trait]
impl BudgetStore for RedisBudgetStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn add_usage(&self, key: &str, tokens: u64, usd: f64, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;

        redis::pipe()
            .atomic()
            .cmd("HINCRBY")
            .arg(key)
            .arg(TOKENS_FIELD)
            .arg(tokens)
            .ignore()
            .cmd("HINCRBYFLOAT")
            .arg(key)
            .arg(USD_FIELD)
            .arg(usd)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::BudgetStore(format!("Redis increment failed: {e}")))?;

        debug!(key = %key, tokens, usd, "Budget usage recorded in Redis");
        Ok(())
    }

    async fn usage(&self, key: &str) -> Result<Usage> {
        let mut conn = self.get_connection().await?;

        let (tokens, usd): (Option<u64>, Option<f64>) = redis::cmd("HMGET")
            .arg(key)
            .arg(TOKENS_FIELD)
            .arg(USD_FIELD)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::BudgetStore(format!("Redis HMGET failed: {e}")))?;

        Ok(Usage {
            tokens: tokens.unwrap_or(0),
            usd: usd.unwrap_or(0.0),
        })
    }
}
