//! Document Repository Port
//!
//! Ingested documents and their embedded chunks.

use async_trait::async_trait;

use crate::domain::{errors::DomainError, Document, DocumentChunk};

/// Which chunks a retrieval may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkScope {
    /// Chunks of documents attached to one thread of the user
    Thread { user_id: String, thread_id: String },
    /// Every chunk the user owns
    User { user_id: String },
}

impl ChunkScope {
    pub fn user_id(&self) -> &str {
        match self {
            ChunkScope::Thread { user_id, .. } | ChunkScope::User { user_id } => user_id,
        }
    }
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Up to `limit` chunks in scope, newest documents first
    async fn find_candidates(
        &self,
        scope: &ChunkScope,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>, DomainError>;

    /// Persist a document and all of its chunks atomically
    async fn save_document(
        &self,
        document: &Document,
        chunks: &[DocumentChunk],
    ) -> Result<Document, DomainError>;
}
