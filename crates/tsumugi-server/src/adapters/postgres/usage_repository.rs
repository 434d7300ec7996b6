//! PostgreSQL implementation of UsageRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tsumugi::{
    DomainError, ModelUsage, UsageRange, UsageRecord, UsageRepository, UsageScope, UsageSummary,
    UsageTotals,
};

pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    api_key_id: Option<String>,
    user_id: Option<String>,
    provider: String,
    model: String,
    #[sqlx(rename = "type")]
    usage_type: String,
    tokens_in: i64,
    tokens_out: i64,
    tokens_total: i64,
    cost: f64,
    currency: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            id: row.id,
            api_key_id: row.api_key_id,
            user_id: row.user_id,
            provider: row.provider,
            model: row.model,
            usage_type: row.usage_type,
            tokens_in: row.tokens_in,
            tokens_out: row.tokens_out,
            tokens_total: row.tokens_total,
            cost: row.cost,
            currency: row.currency,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModelUsageRow {
    provider: String,
    model: String,
    tokens_in: i64,
    tokens_out: i64,
    tokens_total: i64,
    cost: f64,
    count: i64,
}

impl From<ModelUsageRow> for ModelUsage {
    fn from(row: ModelUsageRow) -> Self {
        Self {
            provider: row.provider,
            model: row.model,
            totals: UsageTotals {
                tokens_in: row.tokens_in,
                tokens_out: row.tokens_out,
                tokens_total: row.tokens_total,
                cost: row.cost,
                count: row.count,
            },
        }
    }
}

/// Filter column and bound value for a scope
fn scope_filter(scope: &UsageScope) -> (&'static str, &str) {
    match scope {
        UsageScope::User(user_id) => ("user_id", user_id),
        UsageScope::ApiKey(api_key_id) => ("api_key_id", api_key_id),
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn create(&self, record: &UsageRecord) -> Result<UsageRecord, DomainError> {
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            INSERT INTO usages (id, api_key_id, user_id, provider, model, type,
                                tokens_in, tokens_out, tokens_total, cost, currency, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(&record.api_key_id)
        .bind(&record.user_id)
        .bind(&record.provider)
        .bind(&record.model)
        .bind(&record.usage_type)
        .bind(record.tokens_in)
        .bind(record.tokens_out)
        .bind(record.tokens_total)
        .bind(record.cost)
        .bind(&record.currency)
        .bind(&record.metadata)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(row.into())
    }

    async fn list(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        let (column, value) = scope_filter(scope);
        let sql = format!(
            r#"
            SELECT * FROM usages
            WHERE {column} = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, UsageRow>(&sql)
            .bind(value)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn summarize(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<UsageSummary, DomainError> {
        let (column, value) = scope_filter(scope);
        let sql = format!(
            r#"
            SELECT provider, model,
                   COALESCE(SUM(tokens_in), 0)::BIGINT AS tokens_in,
                   COALESCE(SUM(tokens_out), 0)::BIGINT AS tokens_out,
                   COALESCE(SUM(tokens_total), 0)::BIGINT AS tokens_total,
                   COALESCE(SUM(cost), 0)::DOUBLE PRECISION AS cost,
                   COUNT(*) AS count
            FROM usages
            WHERE {column} = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            GROUP BY provider, model
            ORDER BY provider, model
            "#
        );

        let rows = sqlx::query_as::<_, ModelUsageRow>(&sql)
            .bind(value)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(UsageSummary::from_models(
            rows.into_iter().map(Into::into).collect(),
        ))
    }
}
