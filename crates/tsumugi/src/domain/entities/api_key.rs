//! ApiKey - Billing context for authenticated requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issued API key. Issuance and revocation happen elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    /// Public key identifier presented as the bearer token
    pub key_id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
