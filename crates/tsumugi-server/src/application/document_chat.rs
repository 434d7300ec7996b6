//! Document Chat - one-shot answers grounded in the user's documents
//!
//! The model gets one chance to call fileSearch. Its hits are fed back and a
//! second call, offered no tools, writes the answer. Nothing is streamed and
//! nothing is stored in a conversation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;
use uuid::Uuid;

use tsumugi::{
    ConversationTurn, DocumentRepository, EmbeddingService, ModelProvider, ModelStreamEvent,
    ToolCallDescriptor, ToolResult, ToolSchema, UsageMetadata,
};

use super::chat_orchestrator::{timed_out, DEFAULT_MODEL_CALL_TIMEOUT};
use super::errors::{ChatError, ToolExecutionError};
use super::file_search_tool::{FileSearchHit, FileSearchTool, FILE_SEARCH_TOOL};
use super::retrieval_service::clamp_top_k;
use super::tool_registry::{ServerTool, ToolContext};

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct DocumentChatRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
    pub message: String,
    pub top_k: Option<i64>,
}

/// The start of a chunk an answer drew on
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePreview {
    pub document_id: Uuid,
    pub index: i32,
    pub preview: String,
    pub similarity: f32,
}

impl From<&FileSearchHit> for SourcePreview {
    fn from(hit: &FileSearchHit) -> Self {
        Self {
            document_id: hit.document_id,
            index: hit.index,
            preview: hit.content.chars().take(PREVIEW_CHARS).collect(),
            similarity: hit.similarity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentAnswer {
    pub answer: String,
    /// `<documentId>#<chunkIndex>`, in order of first appearance
    pub citations: Vec<String>,
    pub previews: Vec<SourcePreview>,
    pub no_sources: bool,
    pub tool_calls: Vec<ToolCallDescriptor>,
    pub usage: UsageMetadata,
    pub top_k: usize,
}

impl DocumentAnswer {
    fn new(answer: String, hits: &[FileSearchHit]) -> Self {
        let mut citations: Vec<String> = Vec::new();
        for citation in hits.iter().map(FileSearchHit::citation) {
            if !citations.contains(&citation) {
                citations.push(citation);
            }
        }

        Self {
            answer,
            citations,
            previews: hits.iter().map(SourcePreview::from).collect(),
            no_sources: hits.is_empty(),
            ..Self::default()
        }
    }
}

/// Text, tool calls and usage of one model call, collected without streaming
#[derive(Default)]
struct Completion {
    text: String,
    tool_calls: Vec<ToolCallDescriptor>,
    usage: UsageMetadata,
}

pub struct DocumentChat<R: DocumentRepository, E: EmbeddingService, M: ModelProvider> {
    model: Arc<M>,
    search: Arc<FileSearchTool<R, E>>,
    model_call_timeout: Duration,
}

impl<R, E, M> DocumentChat<R, E, M>
where
    R: DocumentRepository + 'static,
    E: EmbeddingService + 'static,
    M: ModelProvider,
{
    pub fn new(model: Arc<M>, search: Arc<FileSearchTool<R, E>>) -> Self {
        Self {
            model,
            search,
            model_call_timeout: DEFAULT_MODEL_CALL_TIMEOUT,
        }
    }

    pub fn with_model_call_timeout(mut self, limit: Duration) -> Self {
        self.model_call_timeout = limit;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Answer one question from the caller's documents
    pub async fn answer(&self, request: DocumentChatRequest) -> Result<DocumentAnswer, ChatError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput("message is required".to_string()));
        }

        let top_k = clamp_top_k(
            request
                .top_k
                .filter(|k| *k != 0)
                .unwrap_or(self.search.default_top_k() as i64),
        );
        let context = ToolContext {
            user_id: request.user_id,
            thread_id: request.thread_id,
        };

        let mut messages = vec![
            ConversationTurn::system(self.search.instructions().join("\n")),
            ConversationTurn::user(message),
        ];

        let first = self.complete(&messages, &[self.search.schema()]).await?;
        let mut usage = first.usage;

        if first.tool_calls.is_empty() {
            tracing::info!("Document chat answered without searching");
            return Ok(DocumentAnswer {
                usage,
                top_k,
                ..DocumentAnswer::new(first.text, &[])
            });
        }

        let mut hits = Vec::new();
        let mut results = Vec::with_capacity(first.tool_calls.len());
        for call in &first.tool_calls {
            if call.name != FILE_SEARCH_TOOL {
                tracing::warn!("Document chat ignoring unknown tool {}", call.name);
                let error = ToolExecutionError::Unknown(call.name.clone());
                results.push(ToolResult::error(&call.id, &call.name, error));
                continue;
            }

            // Missing arguments fall back to the question and the request's top-K
            let query = call
                .arguments
                .get("query")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .unwrap_or(message);
            let call_top_k = call
                .arguments
                .get("topK")
                .and_then(Value::as_f64)
                .filter(|k| k.is_finite())
                .map(|k| k as i64)
                .unwrap_or(top_k as i64);

            let found = self.search.search(query, Some(call_top_k), &context).await;
            results.push(ToolResult::ok(
                &call.id,
                &call.name,
                json!({ "results": found }),
            ));
            hits.extend(found);
        }

        messages.push(ConversationTurn::assistant_tool_calls(
            first.text,
            first.tool_calls.clone(),
        ));
        messages.extend(results.iter().map(ConversationTurn::tool_result));

        let second = self.complete(&messages, &[]).await?;
        usage.accumulate(&second.usage);

        tracing::info!(
            "Document chat answered from {} chunks ({} tokens)",
            hits.len(),
            usage.total_tokens
        );

        Ok(DocumentAnswer {
            tool_calls: first.tool_calls,
            usage,
            top_k,
            ..DocumentAnswer::new(second.text, &hits)
        })
    }

    async fn complete(
        &self,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> Result<Completion, ChatError> {
        let limit = self.model_call_timeout;
        let mut stream = timeout(limit, self.model.stream(messages, tools))
            .await
            .map_err(|_| timed_out(limit))?
            .map_err(ChatError::ModelStream)?;

        let mut completion = Completion::default();
        while let Some(item) = timeout(limit, stream.next())
            .await
            .map_err(|_| timed_out(limit))?
        {
            match item.map_err(ChatError::ModelStream)? {
                ModelStreamEvent::TextDelta(text) => completion.text.push_str(&text),
                ModelStreamEvent::ToolCalls(calls) => completion.tool_calls.extend(calls),
                ModelStreamEvent::Usage(usage) => completion.usage.accumulate(&usage),
            }
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retrieval_service::tests::chunk;
    use crate::application::retrieval_service::VectorRetriever;
    use crate::application::test_support::{
        InMemoryDocumentRepository, Scripted, ScriptedModel, StaticEmbedding,
    };
    use tsumugi::{DocumentChunk, TurnRole};

    type TestChat = DocumentChat<InMemoryDocumentRepository, StaticEmbedding, ScriptedModel>;

    fn document_chat(chunks: Vec<DocumentChunk>, model: Arc<ScriptedModel>) -> TestChat {
        let retriever = VectorRetriever::new(
            Arc::new(InMemoryDocumentRepository::with_chunks(chunks)),
            Arc::new(StaticEmbedding::new(vec![1.0, 0.0])),
        );
        DocumentChat::new(model, Arc::new(FileSearchTool::new(Arc::new(retriever))))
    }

    fn request(message: &str) -> DocumentChatRequest {
        DocumentChatRequest {
            user_id: "u1".to_string(),
            thread_id: Some("t1".to_string()),
            message: message.to_string(),
            top_k: None,
        }
    }

    fn search_call(id: &str, arguments: Value) -> ToolCallDescriptor {
        ToolCallDescriptor::new(id, FILE_SEARCH_TOOL, arguments)
    }

    fn script(calls: Vec<ToolCallDescriptor>, answer: &str) -> Vec<Vec<Scripted>> {
        vec![
            vec![
                Scripted::Event(ModelStreamEvent::ToolCalls(calls)),
                Scripted::Event(ModelStreamEvent::Usage(UsageMetadata::new(20, 5))),
            ],
            vec![
                Scripted::Event(ModelStreamEvent::TextDelta(answer.to_string())),
                Scripted::Event(ModelStreamEvent::Usage(UsageMetadata::new(60, 10))),
            ],
        ]
    }

    #[tokio::test]
    async fn test_answer_with_citations_and_previews() {
        let mut long = chunk("u1", Some("t1"), 4, vec![1.0, 0.0]);
        long.content = "é".repeat(250);
        let document_id = long.document_id;

        let model = Arc::new(ScriptedModel::new(script(
            vec![
                search_call("tc_1", json!({"query": "refunds"})),
                search_call("tc_2", json!({})),
            ],
            "Refunds take 14 days.",
        )));
        let chat = document_chat(vec![long], model.clone());

        let answer = chat.answer(request("How do refunds work?")).await.unwrap();

        assert_eq!(answer.answer, "Refunds take 14 days.");
        // Both searches hit the same chunk: one citation, one preview per hit
        assert_eq!(answer.citations, vec![format!("{}#4", document_id)]);
        assert_eq!(answer.previews.len(), 2);
        assert_eq!(answer.previews[0].preview.chars().count(), 200);
        assert!(!answer.no_sources);
        assert_eq!(answer.tool_calls.len(), 2);
        assert_eq!(answer.usage, UsageMetadata::new(80, 15));
        assert_eq!(answer.top_k, 5);

        assert_eq!(model.call_count(), 2);
        assert_eq!(model.tools_of_call(0)[0].name, FILE_SEARCH_TOOL);
        assert!(model.tools_of_call(1).is_empty());

        let sent = model.messages_of_call(1);
        let roles: Vec<TurnRole> = sent.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::System, TurnRole::User, TurnRole::Assistant, TurnRole::Tool, TurnRole::Tool]
        );
    }

    #[tokio::test]
    async fn test_no_sources() {
        let model = Arc::new(ScriptedModel::new(script(
            vec![search_call("tc_1", json!({"query": "anything", "topK": 3}))],
            "I couldn't find relevant sources in your files.",
        )));
        let chat = document_chat(Vec::new(), model);

        let answer = chat.answer(request("What is in my files?")).await.unwrap();

        assert!(answer.no_sources);
        assert!(answer.citations.is_empty());
        assert!(answer.previews.is_empty());
        assert_eq!(answer.answer, "I couldn't find relevant sources in your files.");
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_an_error_result() {
        let model = Arc::new(ScriptedModel::new(script(
            vec![ToolCallDescriptor::new("tc_9", "webSearch", json!({}))],
            "done",
        )));
        let chat = document_chat(Vec::new(), model.clone());

        chat.answer(request("search the web")).await.unwrap();

        let sent = model.messages_of_call(1);
        let tool_turn = sent.iter().find(|t| t.role == TurnRole::Tool).unwrap();
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("tc_9"));
        assert!(tool_turn.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_direct_answer_skips_second_call() {
        let model = Arc::new(ScriptedModel::new(vec![vec![Scripted::Event(
            ModelStreamEvent::TextDelta("Hello!".to_string()),
        )]]));
        let chat = document_chat(Vec::new(), model.clone());

        let answer = chat.answer(request("hi")).await.unwrap();

        assert_eq!(answer.answer, "Hello!");
        assert!(answer.no_sources);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_and_model_failure() {
        let model = Arc::new(ScriptedModel::new(vec![vec![Scripted::Event(
            ModelStreamEvent::TextDelta("unused".to_string()),
        )]]));
        let chat = document_chat(Vec::new(), model.clone());
        let err = chat.answer(request("  ")).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert_eq!(model.call_count(), 0);

        let chat = document_chat(Vec::new(), Arc::new(ScriptedModel::unavailable()));
        let err = chat.answer(request("hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::ModelStream(_)));
    }
}
