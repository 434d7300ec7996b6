//! Usage Repository Port
//!
//! Append-only usage ledger plus the read models built from it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{errors::DomainError, UsageRecord, UsageSummary};

/// Whose usage a query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScope {
    User(String),
    ApiKey(String),
}

/// Optional inclusive creation-time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl UsageRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn create(&self, record: &UsageRecord) -> Result<UsageRecord, DomainError>;

    /// Records in scope, newest first
    async fn list(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<Vec<UsageRecord>, DomainError>;

    /// Totals per provider/model plus a grand total
    async fn summarize(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<UsageSummary, DomainError>;
}
