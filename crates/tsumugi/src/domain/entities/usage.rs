//! Usage - Token metering and billing ledger entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token counts reported for one completed turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl UsageMetadata {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }

    /// Sum usage across model round-trips of the same turn
    pub fn accumulate(&mut self, other: &UsageMetadata) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A usage ledger entry. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub api_key_id: Option<String>,
    pub user_id: Option<String>,
    pub provider: String,
    pub model: String,
    #[serde(rename = "type")]
    pub usage_type: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_total: i64,
    pub cost: f64,
    pub currency: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Aggregated usage for one provider/model pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_total: i64,
    pub cost: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub totals: UsageTotals,
}

/// Usage summary grouped by model plus grand totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub by_model: Vec<ModelUsage>,
    pub totals: UsageTotals,
}

impl UsageSummary {
    /// Build the grand totals from the per-model rows
    pub fn from_models(by_model: Vec<ModelUsage>) -> Self {
        let totals = by_model.iter().fold(UsageTotals::default(), |mut acc, m| {
            acc.tokens_in += m.totals.tokens_in;
            acc.tokens_out += m.totals.tokens_out;
            acc.tokens_total += m.totals.tokens_total;
            acc.cost += m.totals.cost;
            acc.count += m.totals.count;
            acc
        });
        Self { by_model, totals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_usage() {
        let mut usage = UsageMetadata::new(10, 5);
        usage.accumulate(&UsageMetadata::new(3, 2));
        assert_eq!(usage, UsageMetadata::new(13, 7));
        assert_eq!(usage.total_tokens, 20);
    }

    #[test]
    fn test_summary_totals() {
        let row = |model: &str, tokens: i64, cost: f64| ModelUsage {
            provider: "openai".to_string(),
            model: model.to_string(),
            totals: UsageTotals {
                tokens_in: tokens,
                tokens_out: tokens,
                tokens_total: tokens * 2,
                cost,
                count: 1,
            },
        };
        let summary = UsageSummary::from_models(vec![row("gpt-4o", 10, 0.5), row("gpt-4o-mini", 4, 0.25)]);
        assert_eq!(summary.totals.tokens_total, 28);
        assert_eq!(summary.totals.count, 2);
        assert_eq!(summary.totals.cost, 0.75);
    }
}
