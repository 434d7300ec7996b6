//! Document search and ingestion DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use tsumugi::{Document, ScoredChunk, UsageMetadata};

use super::ToolCallPayload;
use crate::application::{DocumentAnswer, SourcePreview};

/// Direct document search request
#[derive(Debug, Deserialize, ToSchema)]
pub struct FileQueryRequest {
    pub query: String,
    /// Number of results, clamped to 1..=10 (default: 5)
    pub top_k: Option<i64>,
    /// Search this thread first, then the rest of the user's documents
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileHit {
    pub content: String,
    pub document_id: Uuid,
    pub index: i32,
    pub similarity: f32,
    /// `<documentId>#<chunkIndex>`
    pub citation: String,
}

impl From<ScoredChunk> for FileHit {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            citation: scored.citation(),
            content: scored.chunk.content,
            document_id: scored.chunk.document_id,
            index: scored.chunk.index,
            similarity: scored.similarity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileQueryResponse {
    pub results: Vec<FileHit>,
}

/// Plain-text document ingestion request
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestDocumentRequest {
    pub text: String,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub thread_id: Option<String>,
    /// Words per chunk (default: 300)
    pub chunk_size: Option<usize>,
    /// Words shared by consecutive chunks (default: 50)
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestDocumentResponse {
    pub document_id: Uuid,
    pub title: String,
    pub thread_id: Option<String>,
    pub chunk_count: usize,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl IngestDocumentResponse {
    pub fn new(document: Document, chunk_count: usize) -> Self {
        Self {
            document_id: document.id,
            title: document.title,
            thread_id: document.thread_id,
            chunk_count,
            size_bytes: document.size_bytes,
            created_at: document.created_at,
        }
    }
}

/// One-shot question over the caller's documents
#[derive(Debug, Deserialize, ToSchema)]
pub struct FileChatRequest {
    pub message: String,
    /// Search this thread first, then the rest of the user's documents
    pub thread_id: Option<String>,
    /// Chunks per search, clamped to 1..=10 (default: 5)
    pub top_k: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourcePreviewResponse {
    pub document_id: Uuid,
    pub index: i32,
    /// First 200 characters of the chunk
    pub preview: String,
    pub similarity: f32,
}

impl From<SourcePreview> for SourcePreviewResponse {
    fn from(preview: SourcePreview) -> Self {
        Self {
            document_id: preview.document_id,
            index: preview.index,
            preview: preview.preview,
            similarity: preview.similarity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenUsageResponse {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<UsageMetadata> for TokenUsageResponse {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FileChatResponse {
    pub answer: String,
    /// `<documentId>#<chunkIndex>`, without duplicates
    pub citations: Vec<String>,
    pub previews: Vec<SourcePreviewResponse>,
    pub no_sources: bool,
    pub tool_calls: Vec<ToolCallPayload>,
    pub usage: TokenUsageResponse,
}

impl From<DocumentAnswer> for FileChatResponse {
    fn from(answer: DocumentAnswer) -> Self {
        Self {
            answer: answer.answer,
            citations: answer.citations,
            previews: answer.previews.into_iter().map(Into::into).collect(),
            no_sources: answer.no_sources,
            tool_calls: answer.tool_calls.into_iter().map(Into::into).collect(),
            usage: answer.usage.into(),
        }
    }
}
