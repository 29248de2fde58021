//! DS-Router LLM - Provider capability contract
//!
//! This crate defines what every generation backend must provide to the
//! DS-Router serving pipeline:
//! - Request/response/chunk types shared by every stage
//! - `LlmProvider`: synchronous generation, streaming generation, health check
//! - Error classification into retryable and non-retryable failures
//! - Token counting and per-provider pricing used for budget accounting
//! - `MockProvider`: a scriptable provider for tests and local runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mock;
pub mod pricing;
pub mod provider;
pub mod request;
pub mod token;

pub use error::{Error, Result};
pub use mock::{MockOutcome, MockProvider};
pub use pricing::{PricingTable, ProviderPricing};
pub use provider::{HealthStatus, LlmProvider, ProviderStream};
pub use request::{GenRequest, GenResponse, Metadata, StreamChunk};
pub use token::{count_tokens, TokenCounter, TOKEN_COUNTER};
