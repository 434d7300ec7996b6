//! fileSearch - server tool over the user's ingested documents

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use tsumugi::{DocumentRepository, EmbeddingService, ScoredChunk, ToolSchema};

use super::errors::ToolExecutionError;
use super::retrieval_service::{clamp_top_k, VectorRetriever, DEFAULT_TOP_K};
use super::tool_registry::{ServerTool, ToolContext};

pub const FILE_SEARCH_TOOL: &str = "fileSearch";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchHit {
    pub content: String,
    pub document_id: Uuid,
    pub index: i32,
    pub similarity: f32,
}

impl FileSearchHit {
    /// `<documentId>#<chunkIndex>`
    pub fn citation(&self) -> String {
        format!("{}#{}", self.document_id, self.index)
    }
}

impl From<ScoredChunk> for FileSearchHit {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            content: scored.chunk.content,
            document_id: scored.chunk.document_id,
            index: scored.chunk.index,
            similarity: scored.similarity,
        }
    }
}

pub struct FileSearchTool<R: DocumentRepository, E: EmbeddingService> {
    retriever: Arc<VectorRetriever<R, E>>,
    default_top_k: usize,
}

impl<R: DocumentRepository, E: EmbeddingService> FileSearchTool<R, E> {
    pub fn new(retriever: Arc<VectorRetriever<R, E>>) -> Self {
        Self {
            retriever,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Search with the tool's degradation rules: a missing or zero `top_k`
    /// means the default, and a failed retrieval means no hits.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<i64>,
        context: &ToolContext,
    ) -> Vec<FileSearchHit> {
        let top_k = top_k
            .filter(|k| *k != 0)
            .map(clamp_top_k)
            .unwrap_or_else(|| clamp_top_k(self.default_top_k as i64));

        tracing::info!(
            "🔍 fileSearch: \"{}\" in thread {}",
            query,
            context.thread_id.as_deref().unwrap_or("all")
        );

        let hits: Vec<FileSearchHit> = match self
            .retriever
            .search(&context.user_id, context.thread_id.as_deref(), query, top_k)
            .await
        {
            Ok(results) => results.into_iter().map(FileSearchHit::from).collect(),
            Err(e) => {
                tracing::warn!("fileSearch degraded to no results: {}", e);
                Vec::new()
            }
        };

        tracing::info!("fileSearch found {} results", hits.len());
        hits
    }
}

#[async_trait]
impl<R, E> ServerTool for FileSearchTool<R, E>
where
    R: DocumentRepository + 'static,
    E: EmbeddingService + 'static,
{
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: FILE_SEARCH_TOOL.to_string(),
            description: "Search the user's uploaded documents (thread-first fallback to user) and return top K relevant chunks.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to find relevant document chunks"
                    },
                    "topK": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 10,
                        "description": format!("Number of top results to return (default: {})", self.default_top_k)
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    fn instructions(&self) -> Vec<String> {
        vec![
            "You are a helpful assistant that can search the user's uploaded PDFs.".to_string(),
            "When answering questions that may require knowledge from the user's files, call the fileSearch tool.".to_string(),
            "When you use fileSearch results, quote succinctly and cite with (doc: <documentId>#<chunkIndex>).".to_string(),
            "If no sources are found, say you couldn't find relevant sources in the user's files.".to_string(),
        ]
    }

    async fn execute(
        &self,
        arguments: &Value,
        context: &ToolContext,
    ) -> Result<Value, ToolExecutionError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolExecutionError::InvalidArguments {
                tool: FILE_SEARCH_TOOL.to_string(),
                message: "Query is required and must be a non-empty string".to_string(),
            })?;

        let top_k = arguments
            .get("topK")
            .and_then(Value::as_f64)
            .filter(|k| k.is_finite())
            .map(|k| k as i64);

        let hits = self.search(query, top_k, context).await;
        Ok(json!({ "results": hits }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retrieval_service::tests::chunk;
    use crate::application::test_support::{
        FailingEmbedding, InMemoryDocumentRepository, StaticEmbedding,
    };

    fn context() -> ToolContext {
        ToolContext {
            user_id: "u1".to_string(),
            thread_id: Some("t1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_results_payload_shape() {
        let stored = chunk("u1", Some("t1"), 3, vec![1.0, 0.0]);
        let document_id = stored.document_id;
        let retriever = VectorRetriever::new(
            Arc::new(InMemoryDocumentRepository::with_chunks(vec![stored])),
            Arc::new(StaticEmbedding::new(vec![1.0, 0.0])),
        );
        let tool = FileSearchTool::new(Arc::new(retriever));

        let payload = tool
            .execute(&json!({"query": "  contract terms "}), &context())
            .await
            .unwrap();

        assert_eq!(
            payload,
            json!({"results": [{
                "content": "chunk 3",
                "documentId": document_id,
                "index": 3,
                "similarity": 1.0
            }]})
        );
    }

    #[tokio::test]
    async fn test_embedding_failure_yields_empty_results() {
        let retriever = VectorRetriever::new(
            Arc::new(InMemoryDocumentRepository::default()),
            Arc::new(FailingEmbedding),
        );
        let tool = FileSearchTool::new(Arc::new(retriever));

        let payload = tool
            .execute(&json!({"query": "anything"}), &context())
            .await
            .unwrap();
        assert_eq!(payload, json!({"results": []}));
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let retriever = VectorRetriever::new(
            Arc::new(InMemoryDocumentRepository::default()),
            Arc::new(StaticEmbedding::new(vec![1.0])),
        );
        let tool = FileSearchTool::new(Arc::new(retriever));

        let err = tool.execute(&json!({"query": "   "}), &context()).await.unwrap_err();
        assert!(matches!(err, ToolExecutionError::InvalidArguments { .. }));
    }

    #[test]
    fn test_schema_and_guidance() {
        let retriever = VectorRetriever::new(
            Arc::new(InMemoryDocumentRepository::default()),
            Arc::new(StaticEmbedding::new(vec![1.0])),
        );
        let tool = FileSearchTool::new(Arc::new(retriever)).with_default_top_k(3);
        let schema = tool.schema();

        assert_eq!(schema.name, "fileSearch");
        assert_eq!(schema.parameters["required"], json!(["query"]));
        assert_eq!(schema.parameters["properties"]["topK"]["maximum"], json!(10));
        assert_eq!(tool.instructions().len(), 4);
    }
}
