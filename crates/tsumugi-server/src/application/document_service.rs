//! Document Application Service
//!
//! Turns plain text into an embedded, searchable document.

use std::sync::Arc;

use uuid::Uuid;

use tsumugi::domain::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use tsumugi::{Document, DocumentChunk, DocumentRepository, DomainError, EmbeddingService};

/// Text to ingest plus where it belongs
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub text: String,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

pub struct DocumentService<R: DocumentRepository, E: EmbeddingService> {
    repo: Arc<R>,
    embedding: Arc<E>,
}

impl<R: DocumentRepository, E: EmbeddingService> DocumentService<R, E> {
    pub fn new(repo: Arc<R>, embedding: Arc<E>) -> Self {
        Self { repo, embedding }
    }

    /// Chunk, embed and store a document. Returns it with its chunk count.
    pub async fn ingest(&self, request: IngestRequest) -> Result<(Document, usize), DomainError> {
        let size = request.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let overlap = request.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if size == 0 {
            return Err(DomainError::Validation(
                "chunk_size must be positive".to_string(),
            ));
        }

        let pieces = chunk_text(&request.text, size, overlap);
        if pieces.is_empty() {
            return Err(DomainError::Validation("Document text is empty".to_string()));
        }

        let texts: Vec<String> = pieces.iter().map(|p| p.content.clone()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;
        if embeddings.len() != pieces.len() {
            return Err(DomainError::ExternalService(format!(
                "Expected {} embeddings, got {}",
                pieces.len(),
                embeddings.len()
            )));
        }

        let title = request
            .title
            .clone()
            .or_else(|| request.filename.clone())
            .unwrap_or_else(|| "Untitled".to_string());
        let mut document = Document::new(
            request.user_id.clone(),
            request.thread_id.clone(),
            title,
            request.text.len() as i64,
        );
        document.filename = request.filename;

        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|(piece, embedding)| DocumentChunk {
                id: Uuid::new_v4(),
                document_id: document.id,
                user_id: request.user_id.clone(),
                thread_id: request.thread_id.clone(),
                index: piece.index,
                content: piece.content,
                embedding,
            })
            .collect();

        let saved = self.repo.save_document(&document, &chunks).await?;

        tracing::info!(
            "Ingested document {} ({} chunks) for user {}",
            saved.id,
            chunks.len(),
            saved.user_id
        );

        Ok((saved, chunks.len()))
    }
}
