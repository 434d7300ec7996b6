//! Tsumugi API Client

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use tsumugi::sse::{SseEvent, SseLineBuffer};

/// API Client for Tsumugi
pub struct TsumugiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

// ============================================
// API Types
// ============================================

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One server-sent chat event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "text_created")]
    Started,
    #[serde(rename = "text_delta")]
    Delta { content: String },
    #[serde(rename = "tool_call")]
    ToolCall { tool_call: Vec<ToolCallView> },
    #[serde(rename = "text_done")]
    Done { content: String },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct FileQueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileHit {
    pub content: String,
    pub similarity: f32,
    pub citation: String,
}

#[derive(Debug, Deserialize)]
struct FileQueryResponse {
    results: Vec<FileHit>,
}

#[derive(Debug, Serialize)]
pub struct FileChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SourcePreview {
    pub index: i32,
    pub preview: String,
    pub similarity: f32,
}

#[derive(Debug, Deserialize)]
pub struct FileChatAnswer {
    pub answer: String,
    pub citations: Vec<String>,
    pub previews: Vec<SourcePreview>,
    pub no_sources: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestResponse {
    pub document_id: Uuid,
    pub title: String,
    pub chunk_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct UsageRecord {
    pub model: String,
    pub tokens_total: i64,
    pub cost: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UsageTotals {
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub tokens_total: i64,
    pub cost: f64,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub totals: UsageTotals,
}

#[derive(Debug, Deserialize)]
pub struct UsageSummary {
    pub by_model: Vec<ModelUsage>,
    pub totals: UsageTotals,
}

/// Parse one SSE payload into a chat event
pub fn parse_event(payload: &str) -> Result<StreamEvent> {
    serde_json::from_str(payload).with_context(|| format!("Unexpected event: {}", payload))
}

impl TsumugiClient {
    /// Create a new API client
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let resp = request
            .send()
            .await
            .context("Failed to connect to Tsumugi API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("API error ({}): {}", status, body);
        }

        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        Self::send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Test connection with health check
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(resp.status().is_success())
    }

    /// Stream a chat turn, handing each event to `on_event` as it arrives
    pub async fn chat(
        &self,
        request: &ChatRequest,
        mut on_event: impl FnMut(StreamEvent),
    ) -> Result<()> {
        let resp = Self::send(self.post("/chat/completion").json(request)).await?;

        let mut bytes = resp.bytes_stream();
        let mut lines = SseLineBuffer::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.context("Chat stream interrupted")?;
            for event in lines.feed(&chunk) {
                if let SseEvent::Data(payload) = event {
                    tracing::debug!("event: {}", payload);
                    on_event(parse_event(&payload)?);
                }
            }
        }
        for event in lines.flush() {
            if let SseEvent::Data(payload) = event {
                on_event(parse_event(&payload)?);
            }
        }

        Ok(())
    }

    pub async fn search_documents(&self, request: &FileQueryRequest) -> Result<Vec<FileHit>> {
        let resp: FileQueryResponse = Self::json(self.post("/file/query").json(request)).await?;
        Ok(resp.results)
    }

    /// One-shot answer from the caller's documents
    pub async fn ask_documents(&self, request: &FileChatRequest) -> Result<FileChatAnswer> {
        Self::json(self.post("/file/chat").json(request)).await
    }

    pub async fn ingest_document(&self, request: &IngestRequest) -> Result<IngestResponse> {
        Self::json(self.post("/file/ingest").json(request)).await
    }

    /// Usage records for the calling user, or only the calling key
    pub async fn usage(&self, key_only: bool) -> Result<Vec<UsageRecord>> {
        let path = if key_only { "/usage" } else { "/usage/me" };
        Self::json(self.get(path)).await
    }

    pub async fn usage_summary(&self, key_only: bool) -> Result<UsageSummary> {
        let path = if key_only {
            "/usage/summary"
        } else {
            "/usage/me/summary"
        };
        Self::json(self.get(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        assert!(matches!(
            parse_event(r#"{"type":"text_created"}"#).unwrap(),
            StreamEvent::Started
        ));
        assert!(matches!(
            parse_event(r#"{"type":"text_delta","content":"He"}"#).unwrap(),
            StreamEvent::Delta { ref content } if content == "He"
        ));

        let event = parse_event(
            r#"{"type":"tool_call","tool_call":[{"id":"tc_1","name":"bookFlight","arguments":{"to":"HND"}}]}"#,
        )
        .unwrap();
        let StreamEvent::ToolCall { tool_call } = event else {
            panic!("expected tool call");
        };
        assert_eq!(tool_call[0].name, "bookFlight");
        assert_eq!(tool_call[0].arguments["to"], "HND");
    }

    #[test]
    fn test_file_chat_answer_parses() {
        let answer: FileChatAnswer = serde_json::from_value(serde_json::json!({
            "answer": "Refunds take 14 days.",
            "citations": ["00000000-0000-0000-0000-000000000000#2"],
            "previews": [{
                "document_id": "00000000-0000-0000-0000-000000000000",
                "index": 2,
                "preview": "Refund policy",
                "similarity": 0.5
            }],
            "no_sources": false,
            "tool_calls": [],
            "usage": {"prompt_tokens": 80, "completion_tokens": 15, "total_tokens": 95}
        }))
        .unwrap();

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.previews[0].index, 2);
        assert!(!answer.no_sources);
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(parse_event(r#"{"type":"mystery"}"#).is_err());
        assert!(parse_event("not json").is_err());
    }
}
