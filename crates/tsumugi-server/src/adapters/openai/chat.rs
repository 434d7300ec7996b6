//! OpenAI streaming chat completions
//!
//! Converts neutral conversation turns into the chat completions wire
//! format and turns the SSE response back into model stream events.
//! Tool-call fragments are assembled per index and emitted once complete.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use tsumugi::{
    ConversationTurn, DomainError, ModelProvider, ModelStream, ModelStreamEvent,
    ToolCallDescriptor, ToolSchema, TurnRole, UsageMetadata,
};

use tsumugi::sse::{SseEvent, SseLineBuffer};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiChatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            temperature: 0.7,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, messages: &[ConversationTurn], tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
        }

        body
    }
}

/// One neutral turn in chat completions message form
fn wire_message(turn: &ConversationTurn) -> Value {
    match turn.role {
        TurnRole::Tool => json!({
            "role": "tool",
            "tool_call_id": turn.tool_call_id.clone().unwrap_or_default(),
            "content": turn.content,
        }),
        TurnRole::Assistant if turn.has_tool_calls() => json!({
            "role": "assistant",
            "content": if turn.content.is_empty() { Value::Null } else { json!(turn.content) },
            "tool_calls": turn.tool_calls.iter().map(|call| json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": wire_arguments(&call.arguments),
                }
            })).collect::<Vec<_>>(),
        }),
        role => json!({
            "role": role.to_string(),
            "content": turn.content,
        }),
    }
}

/// Arguments travel as a JSON-encoded string
fn wire_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    id: Option<String>,
    #[serde(rename = "type")]
    call_type: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    call_type: Option<String>,
    name: String,
    arguments: String,
}

/// Parser state carried across chunks of one response
#[derive(Debug, Default)]
struct ChunkAssembler {
    tool_calls: BTreeMap<u32, PartialToolCall>,
}

impl ChunkAssembler {
    fn apply(&mut self, chunk: ChunkResponse) -> Vec<ModelStreamEvent> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(ModelStreamEvent::TextDelta(text));
            }

            for delta in choice.delta.tool_calls {
                let partial = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    partial.id = id;
                }
                if delta.call_type.is_some() {
                    partial.call_type = delta.call_type;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                events.extend(self.finish());
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(ModelStreamEvent::Usage(UsageMetadata {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }));
        }

        events
    }

    /// Emit assembled tool calls, if any
    fn finish(&mut self) -> Option<ModelStreamEvent> {
        if self.tool_calls.is_empty() {
            return None;
        }

        let calls = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|(index, partial)| {
                let arguments = if partial.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial.arguments)
                        .unwrap_or(Value::String(partial.arguments))
                };
                ToolCallDescriptor::new(partial.id, partial.name, arguments).with_signature(json!({
                    "type": partial.call_type.unwrap_or_else(|| "function".to_string()),
                    "index": index,
                }))
            })
            .collect();

        Some(ModelStreamEvent::ToolCalls(calls))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

struct StreamState {
    bytes: ByteStream,
    lines: SseLineBuffer,
    assembler: ChunkAssembler,
    pending: VecDeque<Result<ModelStreamEvent, DomainError>>,
    ended: bool,
}

impl StreamState {
    fn handle(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Data(payload) => match serde_json::from_str::<ChunkResponse>(&payload) {
                    Ok(chunk) => self
                        .pending
                        .extend(self.assembler.apply(chunk).into_iter().map(Ok)),
                    Err(e) => tracing::warn!("Skipping malformed completion chunk: {}", e),
                },
                SseEvent::Done => self.pending.extend(self.assembler.finish().map(Ok)),
            }
        }
    }
}

fn event_stream(bytes: ByteStream) -> ModelStream {
    let state = StreamState {
        bytes,
        lines: SseLineBuffer::new(),
        assembler: ChunkAssembler::default(),
        pending: VecDeque::new(),
        ended: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.ended {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.lines.feed(&chunk);
                    state.handle(events);
                }
                Some(Err(e)) => {
                    state.ended = true;
                    return Some((
                        Err(DomainError::ExternalService(format!("OpenAI stream read error: {e}"))),
                        state,
                    ));
                }
                None => {
                    state.ended = true;
                    let events = state.lines.flush();
                    state.handle(events);
                    state.pending.extend(state.assembler.finish().map(Ok));
                }
            }
        }
    }))
}

#[async_trait]
impl ModelProvider for OpenAiChatProvider {
    async fn stream(
        &self,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> Result<ModelStream, DomainError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, tools))
            .send()
            .await
            .map_err(|e| DomainError::ExternalService(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DomainError::ExternalService(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }

        Ok(event_stream(Box::pin(response.bytes_stream())))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
