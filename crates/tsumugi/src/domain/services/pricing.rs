//! Cost estimation from per-model token prices
//!
//! Prices are quoted per million tokens. Every computed cost is scaled by
//! a process-wide price multiplier and rounded to six decimal places.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multiplier applied to every computed cost unless reconfigured
pub const DEFAULT_PRICE_MULTIPLIER: f64 = 5.0;

pub const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("Pricing not found for model: {0}")]
    UnknownModel(String),
}

/// Price of one model, per million tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Built-in price table
pub fn default_pricing_table() -> HashMap<String, ModelPricing> {
    [
        ("gpt-4.1-mini", ModelPricing::new(0.4, 1.6)),
        ("gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
        ("gpt-4o", ModelPricing::new(2.5, 10.0)),
    ]
    .into_iter()
    .map(|(model, pricing)| (model.to_string(), pricing))
    .collect()
}

/// Itemized cost of one model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub model: String,
    pub currency: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Effective price per token after the multiplier
    pub input_rate: f64,
    pub output_rate: f64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Round half away from zero to six decimal places
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[derive(Debug, Clone)]
pub struct CostEstimator {
    pricing: HashMap<String, ModelPricing>,
    multiplier: f64,
    currency: String,
}

impl Default for CostEstimator {
    fn default() -> Self {
        Self::new(default_pricing_table())
    }
}

impl CostEstimator {
    pub fn new(pricing: HashMap<String, ModelPricing>) -> Self {
        Self {
            pricing,
            multiplier: DEFAULT_PRICE_MULTIPLIER,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Currency used for models whose pricing names none
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn calculate(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<CostBreakdown, PricingError> {
        let pricing = self
            .pricing
            .get(model)
            .ok_or_else(|| PricingError::UnknownModel(model.to_string()))?;

        let input_tokens = input_tokens.max(0);
        let output_tokens = output_tokens.max(0);

        let input_rate = pricing.input_per_million / 1_000_000.0 * self.multiplier;
        let output_rate = pricing.output_per_million / 1_000_000.0 * self.multiplier;
        let input_cost = round6(input_tokens as f64 * input_rate);
        let output_cost = round6(output_tokens as f64 * output_rate);

        Ok(CostBreakdown {
            model: model.to_string(),
            currency: pricing
                .currency
                .clone()
                .unwrap_or_else(|| self.currency.clone()),
            input_tokens,
            output_tokens,
            input_rate,
            output_rate,
            input_cost,
            output_cost,
            // Sum of the rounded parts, so the total always matches the breakdown
            total_cost: round6(input_cost + output_cost),
        })
    }

    pub fn set_model_pricing(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.pricing.insert(model.into(), pricing);
    }

    pub fn model_pricing(&self, model: &str) -> Option<&ModelPricing> {
        self.pricing.get(model)
    }

    /// Non-finite or non-positive values reset the multiplier to 1
    pub fn set_multiplier(&mut self, multiplier: f64) {
        self.multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            1.0
        };
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}
