//! PostgreSQL implementation of DocumentRepository
//!
//! Embeddings are stored as `REAL[]`; similarity is computed in the
//! application over the candidate pool this repository returns.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tsumugi::{ChunkScope, Document, DocumentChunk, DocumentRepository, DomainError};

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    user_id: String,
    thread_id: Option<String>,
    title: String,
    filename: Option<String>,
    mime_type: String,
    size_bytes: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            thread_id: row.thread_id,
            title: row.title,
            filename: row.filename,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    document_id: Uuid,
    user_id: String,
    thread_id: Option<String>,
    chunk_index: i32,
    content: String,
    embedding: Vec<f32>,
}

impl From<ChunkRow> for DocumentChunk {
    fn from(row: ChunkRow) -> Self {
        Self {
            id: row.id,
            document_id: row.document_id,
            user_id: row.user_id,
            thread_id: row.thread_id,
            index: row.chunk_index,
            content: row.content,
            embedding: row.embedding,
        }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn find_candidates(
        &self,
        scope: &ChunkScope,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>, DomainError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match scope {
            ChunkScope::Thread { user_id, thread_id } => {
                sqlx::query_as::<_, ChunkRow>(
                    r#"
                    SELECT c.id, c.document_id, c.user_id, c.thread_id, c.chunk_index, c.content, c.embedding
                    FROM document_chunks c
                    JOIN documents d ON d.id = c.document_id
                    WHERE c.user_id = $1 AND c.thread_id = $2
                    ORDER BY d.created_at DESC, c.chunk_index ASC
                    LIMIT $3
                    "#,
                )
                .bind(user_id)
                .bind(thread_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            ChunkScope::User { user_id } => {
                sqlx::query_as::<_, ChunkRow>(
                    r#"
                    SELECT c.id, c.document_id, c.user_id, c.thread_id, c.chunk_index, c.content, c.embedding
                    FROM document_chunks c
                    JOIN documents d ON d.id = c.document_id
                    WHERE c.user_id = $1
                    ORDER BY d.created_at DESC, c.chunk_index ASC
                    LIMIT $2
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn save_document(
        &self,
        document: &Document,
        chunks: &[DocumentChunk],
    ) -> Result<Document, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (id, user_id, thread_id, title, filename, mime_type, size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(document.id)
        .bind(&document.user_id)
        .bind(&document.thread_id)
        .bind(&document.title)
        .bind(&document.filename)
        .bind(&document.mime_type)
        .bind(document.size_bytes)
        .bind(document.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DomainError::Repository(e.to_string()))?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (id, document_id, user_id, thread_id, chunk_index, content, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(&chunk.user_id)
            .bind(&chunk.thread_id)
            .bind(chunk.index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(row.into())
    }
}
