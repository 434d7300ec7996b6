//! Document - Ingested text and its retrievable chunks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ingested document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub title: String,
    pub filename: Option<String>,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        user_id: impl Into<String>,
        thread_id: Option<String>,
        title: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            thread_id,
            title: title.into(),
            filename: None,
            mime_type: "text/plain".to_string(),
            size_bytes,
            created_at: Utc::now(),
        }
    }
}

/// A slice of a document with its own embedding. Read-only after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub index: i32,
    pub content: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// A chunk paired with its similarity to a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

impl ScoredChunk {
    /// Citation key in `<documentId>#<chunkIndex>` form
    pub fn citation(&self) -> String {
        format!("{}#{}", self.chunk.document_id, self.chunk.index)
    }
}
