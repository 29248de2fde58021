//! Per-provider pricing
//!
//! Used to price a response when the backend does not report its own cost.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Pricing information for a provider (per 1M tokens)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderPricing {
    /// Cost per 1M input tokens (USD)
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD)
    pub output_cost_per_million: f64,
}

impl ProviderPricing {
    /// Create a pricing entry
    #[must_use]
    pub const fn new(input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            input_cost_per_million,
            output_cost_per_million,
        }
    }

    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (f64::from(input_tokens) / 1_000_000.0) * self.input_cost_per_million;
        let output_cost = (f64::from(output_tokens) / 1_000_000.0) * self.output_cost_per_million;
        input_cost + output_cost
    }
}

/// Pricing keyed by provider name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(HashMap<String, ProviderPricing>);

impl PricingTable {
    /// Pricing for the default tier provider names
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = HashMap::new();
        table.insert("fast".to_string(), ProviderPricing::new(0.15, 0.60));
        table.insert("thinking".to_string(), ProviderPricing::new(1.10, 4.40));
        table.insert("thinking_pro".to_string(), ProviderPricing::new(15.00, 60.00));
        table.insert("local".to_string(), ProviderPricing::new(0.0, 0.0));
        Self(table)
    }

    /// Set pricing for a provider
    pub fn insert(&mut self, provider: impl Into<String>, pricing: ProviderPricing) {
        self.0.insert(provider.into(), pricing);
    }

    /// Get pricing for a provider
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&ProviderPricing> {
        self.0.get(provider)
    }

    /// Estimate cost for a provider; unknown providers cost nothing
    #[must_use]
    pub fn estimate(&self, provider: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.get(provider) {
            Some(pricing) => pricing.calculate_cost(input_tokens, output_tokens),
            None => {
                debug!(provider = %provider, "No pricing configured, cost treated as zero");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost() {
        let pricing = ProviderPricing::new(2.0, 8.0);
        let cost = pricing.calculate_cost(500_000, 250_000);
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_provider_is_free() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.estimate("nonexistent", 1000, 1000), 0.0);
        assert!(table.estimate("thinking_pro", 1000, 1000) > table.estimate("fast", 1000, 1000));
    }
}
