//! Usage metering DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use tsumugi::{ModelUsage, UsageRange, UsageRecord, UsageSummary, UsageTotals};

/// Optional inclusive creation-time window
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UsageQuery {
    /// RFC 3339 lower bound
    pub from: Option<DateTime<Utc>>,
    /// RFC 3339 upper bound
    pub to: Option<DateTime<Utc>>,
}

impl From<UsageQuery> for UsageRange {
    fn from(query: UsageQuery) -> Self {
        Self {
            from: query.from,
            to: query.to,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageRecordResponse {
    pub id: Uuid,
    pub api_key_id: Option<String>,
    pub provider: String,
    pub model: String,
    #[serde(rename = "type")]
    pub usage_type: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_total: i64,
    pub cost: f64,
    pub currency: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<UsageRecord> for UsageRecordResponse {
    fn from(record: UsageRecord) -> Self {
        Self {
            id: record.id,
            api_key_id: record.api_key_id,
            provider: record.provider,
            model: record.model,
            usage_type: record.usage_type,
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            tokens_total: record.tokens_total,
            cost: record.cost,
            currency: record.currency,
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageTotalsResponse {
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_total: i64,
    pub cost: f64,
    pub count: i64,
}

impl From<UsageTotals> for UsageTotalsResponse {
    fn from(totals: UsageTotals) -> Self {
        Self {
            tokens_in: totals.tokens_in,
            tokens_out: totals.tokens_out,
            tokens_total: totals.tokens_total,
            cost: totals.cost,
            count: totals.count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelUsageResponse {
    pub provider: String,
    pub model: String,
    pub totals: UsageTotalsResponse,
}

impl From<ModelUsage> for ModelUsageResponse {
    fn from(usage: ModelUsage) -> Self {
        Self {
            provider: usage.provider,
            model: usage.model,
            totals: usage.totals.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageSummaryResponse {
    pub by_model: Vec<ModelUsageResponse>,
    pub totals: UsageTotalsResponse,
}

impl From<UsageSummary> for UsageSummaryResponse {
    fn from(summary: UsageSummary) -> Self {
        Self {
            by_model: summary.by_model.into_iter().map(Into::into).collect(),
            totals: summary.totals.into(),
        }
    }
}
