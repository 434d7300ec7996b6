//! API Key Repository Port

use async_trait::async_trait;

use crate::domain::{errors::DomainError, ApiKey};

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Find an active key by its secret value
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Record that the key was just used
    async fn touch(&self, id: &str) -> Result<(), DomainError>;
}
