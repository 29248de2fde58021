//! Budget Tracker - per-UTC-day token and USD accounting
//!
//! Counters live in a store with atomic increments so concurrent requests
//! across processes never lose an update. Redis is the shared store; an
//! in-process store stands in when Redis is absent or unreachable.

mod redis_store;
mod store;
mod tracker;


pub use redis_store::RedisBudgetStore;
pub use store::{BudgetStore, MemoryBudgetStore, Usage};
pub use tracker::{BudgetStatus, BudgetTracker};
