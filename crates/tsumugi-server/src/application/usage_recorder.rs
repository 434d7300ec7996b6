//! Usage Recorder Application Service
//!
//! Prices completed turns and keeps the usage ledger.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use tsumugi::{
    CostBreakdown, CostEstimator, DomainError, Provider, UsageMetadata, UsageRange, UsageRecord,
    UsageRepository, UsageScope, UsageSummary, UsageType,
};

use super::errors::UsageError;

pub const DEFAULT_USAGE_MODEL: &str = "gpt-4o-mini";

/// Billing context attached to an authenticated request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub api_key_id: Option<String>,
    pub user_id: Option<String>,
}

/// What a usage entry is for
#[derive(Debug, Clone)]
pub struct UsageOptions {
    pub provider: String,
    pub model: String,
    pub usage_type: UsageType,
    pub metadata: serde_json::Value,
}

impl Default for UsageOptions {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAI.to_string(),
            model: DEFAULT_USAGE_MODEL.to_string(),
            usage_type: UsageType::Chat,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Costs of a turn, plus the ledger entry when one was written
#[derive(Debug, Clone)]
pub struct RecordedUsage {
    pub costs: CostBreakdown,
    pub record: Option<UsageRecord>,
}

pub struct UsageRecorder<U: UsageRepository> {
    repo: Arc<U>,
    estimator: CostEstimator,
}

impl<U: UsageRepository> UsageRecorder<U> {
    pub fn new(repo: Arc<U>, estimator: CostEstimator) -> Self {
        Self { repo, estimator }
    }

    /// Price the usage and, when the request carries an API key, store it
    pub async fn record_from_request(
        &self,
        context: &RequestContext,
        usage: &UsageMetadata,
        options: UsageOptions,
    ) -> Result<RecordedUsage, UsageError> {
        let costs = self.estimator.calculate(
            &options.model,
            i64::from(usage.input_tokens),
            i64::from(usage.output_tokens),
        )?;

        let Some(api_key_id) = context.api_key_id.clone() else {
            tracing::debug!("No API key on request, usage not recorded");
            return Ok(RecordedUsage { costs, record: None });
        };

        let tokens_total = if usage.total_tokens > 0 {
            i64::from(usage.total_tokens)
        } else {
            costs.input_tokens + costs.output_tokens
        };

        let record = UsageRecord {
            id: Uuid::new_v4(),
            api_key_id: Some(api_key_id),
            user_id: context.user_id.clone(),
            provider: options.provider,
            model: options.model,
            usage_type: options.usage_type.to_string(),
            tokens_in: costs.input_tokens,
            tokens_out: costs.output_tokens,
            tokens_total,
            cost: costs.total_cost,
            currency: costs.currency.clone(),
            metadata: options.metadata,
            created_at: Utc::now(),
        };

        let saved = self
            .repo
            .create(&record)
            .await
            .map_err(UsageError::Repository)?;

        tracing::info!(
            "Recorded usage {}: {} tokens, {} {}",
            saved.id,
            saved.tokens_total,
            saved.cost,
            saved.currency
        );

        Ok(RecordedUsage {
            costs,
            record: Some(saved),
        })
    }

    /// Ledger entries, newest first
    pub async fn list(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        self.repo.list(scope, range).await
    }

    pub async fn summary(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<UsageSummary, DomainError> {
        self.repo.summarize(scope, range).await
    }
}
