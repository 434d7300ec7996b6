//! Chat Orchestrator
//!
//! Drives one user turn through the model: streams text to the client as
//! it arrives, runs server tools between model calls, forwards client tool
//! calls, and persists the turn once it produced a final answer.
//!
//! Each iteration is one model round-trip:
//!
//! ```text
//! STREAMING ──no tool calls──────────────► DONE (text_done, persist)
//!     │
//!     └─tool calls─► TOOL_DETECTED ──client only──► DONE (tool_call, no persist)
//!                        │
//!                        └─any server tool─► SERVER_TOOLS_EXECUTING ─► STREAMING
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tsumugi::domain::DEFAULT_MAX_HISTORY_TOKENS;
use tsumugi::{
    ChatEvent, ConversationStore, ConversationTurn, DomainError, ModelProvider, ModelStreamEvent,
    TokenBudgetTrimmer, ToolCallDescriptor, ToolResult, ToolSchema, UsageMetadata,
};

use super::errors::{ChatError, ToolExecutionError};
use super::tool_registry::{ClientToolSpec, ResolvedTools, ToolContext, ToolRegistry};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_MODEL_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// New user input for a turn
#[derive(Debug, Clone)]
pub enum ChatInput {
    Text(String),
    Turns(Vec<ConversationTurn>),
}

impl ChatInput {
    /// True when the input carries no text at all
    pub fn is_blank(&self) -> bool {
        match self {
            ChatInput::Text(text) => text.trim().is_empty(),
            ChatInput::Turns(turns) => turns.iter().all(|t| t.content.trim().is_empty()),
        }
    }

    fn into_turns(self) -> Vec<ConversationTurn> {
        match self {
            ChatInput::Text(text) if text.trim().is_empty() => Vec::new(),
            ChatInput::Text(text) => vec![ConversationTurn::user(text)],
            ChatInput::Turns(turns) => turns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub input: ChatInput,
    pub instructions: Option<String>,
    pub client_tools: Vec<ClientToolSpec>,
    /// Tool calls previously forwarded to the client, echoed back on resume
    pub tool_calls: Vec<ToolCallDescriptor>,
    /// Client tool outputs; non-empty means the turn resumes a suspended loop
    pub tool_results: Vec<ToolResult>,
}

impl ChatTurnRequest {
    pub fn text(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            input: ChatInput::Text(text.into()),
            instructions: None,
            client_tools: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }
}

/// A turn whose client tools have been compiled, ready to run
pub struct PreparedTurn {
    request: ChatTurnRequest,
    tools: ResolvedTools,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatTurnOutcome {
    pub content: String,
    pub usage: UsageMetadata,
    /// Client tool calls awaiting results; empty when the turn completed
    pub pending_tool_calls: Vec<ToolCallDescriptor>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
    pub max_history_tokens: u32,
    pub model_call_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history_tokens: DEFAULT_MAX_HISTORY_TOKENS,
            model_call_timeout: DEFAULT_MODEL_CALL_TIMEOUT,
        }
    }
}

/// What one model call produced
#[derive(Default)]
struct RoundTrip {
    text: String,
    tool_calls: Vec<ToolCallDescriptor>,
    usage: UsageMetadata,
}

/// Output side of a turn. `Started` goes out once, before the first fragment.
struct EventSink<'a> {
    tx: &'a mpsc::Sender<ChatEvent>,
    started: bool,
}

impl<'a> EventSink<'a> {
    fn new(tx: &'a mpsc::Sender<ChatEvent>) -> Self {
        Self { tx, started: false }
    }

    async fn send(&self, event: ChatEvent) -> Result<(), ChatError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ChatError::ClientDisconnected)
    }

    async fn delta(&mut self, content: String) -> Result<(), ChatError> {
        if !self.started {
            self.send(ChatEvent::Started).await?;
            self.started = true;
        }
        self.send(ChatEvent::Delta { content }).await
    }
}

pub struct ChatOrchestrator<S: ConversationStore, M: ModelProvider> {
    store: Arc<S>,
    model: Arc<M>,
    tools: ToolRegistry,
    trimmer: TokenBudgetTrimmer,
    config: OrchestratorConfig,
}

impl<S: ConversationStore, M: ModelProvider> ChatOrchestrator<S, M> {
    pub fn new(
        store: Arc<S>,
        model: Arc<M>,
        tools: ToolRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            model,
            tools,
            trimmer: TokenBudgetTrimmer::new(config.max_history_tokens),
            config,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Validate the input and compile the caller's tool declarations.
    ///
    /// Fails before any event is produced, so callers can still answer with
    /// a plain error response.
    pub fn prepare(&self, request: ChatTurnRequest) -> Result<PreparedTurn, ChatError> {
        if request.tool_results.is_empty() && request.input.is_blank() {
            return Err(ChatError::InvalidInput("input is required".to_string()));
        }
        let tools = self.tools.resolve(&request.client_tools)?;
        Ok(PreparedTurn { request, tools })
    }

    /// Stored turns of a conversation, oldest first
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>, DomainError> {
        self.store.read_all(conversation_id).await
    }

    /// Prepare and run one turn, writing its events to `sink`.
    ///
    /// On success exactly one terminal event has been sent. On error no
    /// terminal event was sent and nothing was persisted.
    pub async fn stream_chat(
        &self,
        request: ChatTurnRequest,
        sink: &mpsc::Sender<ChatEvent>,
    ) -> Result<ChatTurnOutcome, ChatError> {
        let turn = self.prepare(request)?;
        self.stream_prepared(turn, sink).await
    }

    /// Run a prepared turn, writing its events to `sink`
    pub async fn stream_prepared(
        &self,
        turn: PreparedTurn,
        sink: &mpsc::Sender<ChatEvent>,
    ) -> Result<ChatTurnOutcome, ChatError> {
        let PreparedTurn { request, tools } = turn;
        let ChatTurnRequest {
            conversation_id,
            user_id,
            input,
            instructions,
            client_tools: _,
            tool_calls,
            tool_results,
        } = request;

        let schemas = tools.schemas();

        let mut working = Vec::new();
        if let Some(system) = system_turn(instructions.as_deref(), &tools.instructions()) {
            working.push(system);
        }
        working.extend(
            self.store
                .read_all(&conversation_id)
                .await
                .map_err(ChatError::Store)?,
        );

        // Turns persisted with the final answer
        let mut new_turns = input.into_turns();
        if !tool_results.is_empty() {
            tracing::info!(
                "Resuming conversation {} with {} tool results",
                conversation_id,
                tool_results.len()
            );
            new_turns.push(resumed_call_turn(&tool_calls, &tool_results));
            new_turns.extend(tool_results.iter().map(ConversationTurn::tool_result));
        }
        working.extend(new_turns.iter().cloned());

        let context = ToolContext {
            user_id,
            thread_id: Some(conversation_id.clone()),
        };
        let mut events = EventSink::new(sink);
        let mut content = String::new();
        let mut usage = UsageMetadata::default();

        for iteration in 1..=self.config.max_iterations.max(1) {
            let messages = self
                .trimmer
                .trim(&working, |turns| self.model.estimate_token_count(turns));
            let round = self.round_trip(&messages, &schemas, &mut events).await?;
            usage.accumulate(&round.usage);
            content.push_str(&round.text);

            tracing::info!(
                "Conversation {} round-trip {}: {} chars, {} tool calls",
                conversation_id,
                iteration,
                round.text.len(),
                round.tool_calls.len()
            );

            if round.tool_calls.is_empty() {
                new_turns.push(ConversationTurn::assistant(content.clone()));
                self.store
                    .append_all(&conversation_id, &new_turns)
                    .await
                    .map_err(ChatError::Store)?;

                if events
                    .send(ChatEvent::Completed {
                        content: content.clone(),
                    })
                    .await
                    .is_err()
                {
                    tracing::info!("Client left before the final event of {}", conversation_id);
                }

                return Ok(ChatTurnOutcome {
                    content,
                    usage,
                    pending_tool_calls: Vec::new(),
                });
            }

            let (server_calls, client_calls): (Vec<_>, Vec<_>) = round
                .tool_calls
                .into_iter()
                .partition(|call| tools.server_tool(&call.name).is_some());

            if server_calls.is_empty() {
                check_client_calls(&tools, &client_calls);
                events
                    .send(ChatEvent::ToolCallDetected {
                        calls: client_calls.clone(),
                    })
                    .await?;

                return Ok(ChatTurnOutcome {
                    content,
                    usage: UsageMetadata::default(),
                    pending_tool_calls: client_calls,
                });
            }

            if !client_calls.is_empty() {
                tracing::warn!(
                    "Dropping {} client tool calls issued alongside server tools",
                    client_calls.len()
                );
            }

            let results = self
                .execute_server_tools(&tools, &server_calls, &context)
                .await;
            working.push(ConversationTurn::assistant_tool_calls(round.text, server_calls));
            working.extend(results.iter().map(ConversationTurn::tool_result));
        }

        tracing::warn!(
            "Conversation {} reached {} round-trips without a final answer",
            conversation_id,
            self.config.max_iterations
        );
        events
            .send(ChatEvent::Completed {
                content: content.clone(),
            })
            .await?;

        Ok(ChatTurnOutcome {
            content,
            usage,
            pending_tool_calls: Vec::new(),
        })
    }

    /// One model call, streaming text out as it arrives
    async fn round_trip(
        &self,
        messages: &[ConversationTurn],
        schemas: &[ToolSchema],
        events: &mut EventSink<'_>,
    ) -> Result<RoundTrip, ChatError> {
        let limit = self.config.model_call_timeout;
        let mut stream = timeout(limit, self.model.stream(messages, schemas))
            .await
            .map_err(|_| timed_out(limit))?
            .map_err(|e| {
                tracing::error!("Model call failed to start: {}", e);
                ChatError::ModelStream(e)
            })?;

        let mut round = RoundTrip::default();
        while let Some(item) = timeout(limit, stream.next())
            .await
            .map_err(|_| timed_out(limit))?
        {
            match item {
                Ok(ModelStreamEvent::TextDelta(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    round.text.push_str(&text);
                    if let Err(e) = events.delta(text).await {
                        tracing::info!("Client disconnected, abandoning model stream");
                        return Err(e);
                    }
                }
                Ok(ModelStreamEvent::ToolCalls(calls)) => round.tool_calls.extend(calls),
                Ok(ModelStreamEvent::Usage(usage)) => round.usage.accumulate(&usage),
                Err(e) => {
                    tracing::error!("Model stream failed: {}", e);
                    return Err(ChatError::ModelStream(e));
                }
            }
        }

        Ok(round)
    }

    /// Run server tool calls concurrently; failures become error payloads
    async fn execute_server_tools(
        &self,
        tools: &ResolvedTools,
        calls: &[ToolCallDescriptor],
        context: &ToolContext,
    ) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| async move {
            let outcome = match tools.server_tool(&call.name) {
                Some(tool) => tool.execute(&call.arguments, context).await,
                None => Err(ToolExecutionError::Unknown(call.name.clone())),
            };

            match outcome {
                Ok(value) => ToolResult::ok(&call.id, &call.name, value),
                Err(e) => {
                    tracing::warn!("Server tool {} failed: {}", call.name, e);
                    ToolResult::error(&call.id, &call.name, e)
                }
            }
        }))
        .await
    }
}

pub(super) fn timed_out(limit: Duration) -> ChatError {
    ChatError::ModelStream(DomainError::Timeout(format!(
        "model call exceeded {}s",
        limit.as_secs()
    )))
}

/// Caller instructions followed by server tool guidance
fn system_turn(instructions: Option<&str>, guidance: &[String]) -> Option<ConversationTurn> {
    let lines: Vec<&str> = instructions
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .into_iter()
        .chain(guidance.iter().map(String::as_str))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(ConversationTurn::system(lines.join("\n")))
    }
}

/// The assistant turn that issued the calls being answered, one call per result
fn resumed_call_turn(calls: &[ToolCallDescriptor], results: &[ToolResult]) -> ConversationTurn {
    let calls = results
        .iter()
        .map(|result| {
            calls
                .iter()
                .find(|call| call.id == result.tool_call_id)
                .cloned()
                .unwrap_or_else(|| {
                    ToolCallDescriptor::new(&result.tool_call_id, &result.name, json!({}))
                })
        })
        .collect();

    ConversationTurn::assistant_tool_calls("", calls)
}

fn check_client_calls(tools: &ResolvedTools, calls: &[ToolCallDescriptor]) {
    for call in calls {
        match tools.client_tool(&call.name) {
            Some(decl) => {
                if let Err(e) = decl.validate(&call.arguments) {
                    tracing::warn!("Forwarding tool call with unexpected arguments: {}", e);
                }
            }
            None => tracing::warn!("Model called undeclared tool {}", call.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{InMemoryConversationStore, Scripted, ScriptedModel};
    use crate::application::tool_registry::{ClientArgSpec, ServerTool};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tsumugi::TurnRole;

    const THREAD: &str = "thread_1";

    struct Lookup;

    #[async_trait]
    impl ServerTool for Lookup {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "lookup".to_string(),
                description: "Look something up".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        fn instructions(&self) -> Vec<String> {
            vec!["Call lookup for facts.".to_string()]
        }

        async fn execute(
            &self,
            _arguments: &Value,
            context: &ToolContext,
        ) -> Result<Value, ToolExecutionError> {
            Ok(json!({"found": true, "thread": context.thread_id}))
        }
    }

    struct Broken;

    #[async_trait]
    impl ServerTool for Broken {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "broken".to_string(),
                description: "Always fails".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _arguments: &Value,
            _context: &ToolContext,
        ) -> Result<Value, ToolExecutionError> {
            Err(ToolExecutionError::Failed {
                tool: "broken".to_string(),
                message: "backend down".to_string(),
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Lookup)).unwrap();
        registry.register(Arc::new(Broken)).unwrap();
        registry
    }

    fn orchestrator(
        store: Arc<InMemoryConversationStore>,
        model: Arc<ScriptedModel>,
    ) -> ChatOrchestrator<InMemoryConversationStore, ScriptedModel> {
        ChatOrchestrator::new(store, model, registry(), OrchestratorConfig::default())
    }

    fn text(s: &str) -> Scripted {
        Scripted::Event(ModelStreamEvent::TextDelta(s.to_string()))
    }

    fn calls(calls: Vec<ToolCallDescriptor>) -> Scripted {
        Scripted::Event(ModelStreamEvent::ToolCalls(calls))
    }

    fn usage(input: u32, output: u32) -> Scripted {
        Scripted::Event(ModelStreamEvent::Usage(UsageMetadata::new(input, output)))
    }

    fn book_flight_spec() -> ClientToolSpec {
        let mut args = BTreeMap::new();
        args.insert(
            "to".to_string(),
            ClientArgSpec {
                type_name: "string".to_string(),
                description: None,
            },
        );
        ClientToolSpec {
            name: "bookFlight".to_string(),
            description: Some("Book a flight".to_string()),
            args,
        }
    }

    async fn run(
        orchestrator: &ChatOrchestrator<InMemoryConversationStore, ScriptedModel>,
        request: ChatTurnRequest,
    ) -> (Result<ChatTurnOutcome, ChatError>, Vec<ChatEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = orchestrator.stream_chat(request, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    fn terminal_count(events: &[ChatEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn test_plain_chat_streams_and_persists() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![
            text("Hel"),
            text("lo!"),
            usage(12, 3),
        ]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "Hello")).await;
        let outcome = result.unwrap();

        assert_eq!(
            events,
            vec![
                ChatEvent::Started,
                ChatEvent::Delta { content: "Hel".into() },
                ChatEvent::Delta { content: "lo!".into() },
                ChatEvent::Completed { content: "Hello!".into() },
            ]
        );
        assert_eq!(outcome.content, "Hello!");
        assert_eq!(outcome.usage, UsageMetadata::new(12, 3));
        assert_eq!(
            store.history(THREAD),
            vec![ConversationTurn::user("Hello"), ConversationTurn::assistant("Hello!")]
        );
    }

    #[tokio::test]
    async fn test_system_turn_leads_and_is_not_persisted() {
        let store = Arc::new(InMemoryConversationStore::with_history(
            THREAD,
            vec![ConversationTurn::user("earlier"), ConversationTurn::assistant("reply")],
        ));
        let model = Arc::new(ScriptedModel::new(vec![vec![text("ok")]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "now");
        request.instructions = Some("Be terse.".to_string());
        run(&orchestrator, request).await.0.unwrap();

        let sent = model.messages_of_call(0);
        assert_eq!(sent[0], ConversationTurn::system("Be terse.\nCall lookup for facts."));
        assert_eq!(sent[1], ConversationTurn::user("earlier"));
        assert_eq!(sent.last().unwrap(), &ConversationTurn::user("now"));
        assert!(store.history(THREAD).iter().all(|t| t.role != TurnRole::System));
        assert_eq!(model.tools_of_call(0).len(), 2);
    }

    #[tokio::test]
    async fn test_server_tool_round_trip_is_invisible() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![
            vec![calls(vec![ToolCallDescriptor::new("tc_s", "lookup", json!({"q": "x"}))]), usage(10, 2)],
            vec![text("Found it"), usage(20, 4)],
        ]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "look")).await;
        let outcome = result.unwrap();

        assert!(events
            .iter()
            .all(|e| !matches!(e, ChatEvent::ToolCallDetected { .. })));
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(outcome.usage, UsageMetadata::new(30, 6));

        let second = model.messages_of_call(1);
        let call_pos = second.iter().position(|t| t.has_tool_calls()).unwrap();
        let result_turn = &second[call_pos + 1];
        assert!(result_turn.answers(&second[call_pos]));
        assert!(result_turn.content.contains("\"found\":true"));
        assert!(result_turn.content.contains(THREAD));

        // Intermediate tool turns are not persisted
        assert_eq!(
            store.history(THREAD),
            vec![ConversationTurn::user("look"), ConversationTurn::assistant("Found it")]
        );
    }

    #[tokio::test]
    async fn test_failing_server_tool_is_encoded_not_fatal() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![
            vec![calls(vec![ToolCallDescriptor::new("tc_b", "broken", json!({}))])],
            vec![text("Sorry, the tool failed")],
        ]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let (result, _) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "try")).await;
        assert!(result.is_ok());

        let second = model.messages_of_call(1);
        let tool_turn = second.iter().find(|t| t.role == TurnRole::Tool).unwrap();
        let payload: Value = serde_json::from_str(&tool_turn.content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("backend down"));
    }

    #[tokio::test]
    async fn test_loop_terminates_without_persisting() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![
            text("thinking "),
            calls(vec![ToolCallDescriptor::new("tc_loop", "lookup", json!({}))]),
        ]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "loop")).await;
        let outcome = result.unwrap();

        assert_eq!(model.call_count(), DEFAULT_MAX_ITERATIONS);
        assert_eq!(store.append_count(), 0);
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(events.last(), Some(ChatEvent::Completed { .. })));
        assert_eq!(outcome.content, "thinking ".repeat(DEFAULT_MAX_ITERATIONS));
        assert_eq!(
            events.iter().filter(|e| **e == ChatEvent::Started).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_client_tool_calls_are_forwarded_without_writes() {
        let store = Arc::new(InMemoryConversationStore::default());
        let call = ToolCallDescriptor::new("tc_1", "bookFlight", json!({"to": "HND"}))
            .with_signature(json!({"type": "function", "index": 0}));
        let model = Arc::new(ScriptedModel::new(vec![vec![calls(vec![call.clone()]), usage(9, 9)]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "Fly me to Tokyo");
        request.client_tools = vec![book_flight_spec()];
        let (result, events) = run(&orchestrator, request).await;
        let outcome = result.unwrap();

        assert_eq!(
            events,
            vec![ChatEvent::ToolCallDetected {
                calls: vec![call.clone()]
            }]
        );
        assert_eq!(outcome.pending_tool_calls, vec![call]);
        assert!(outcome.usage.is_empty());
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn test_mixed_batch_runs_server_tools_only() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![
            vec![calls(vec![
                ToolCallDescriptor::new("tc_s", "lookup", json!({})),
                ToolCallDescriptor::new("tc_c", "bookFlight", json!({"to": "KIX"})),
            ])],
            vec![text("done")],
        ]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "both");
        request.client_tools = vec![book_flight_spec()];
        let (result, events) = run(&orchestrator, request).await;

        assert_eq!(result.unwrap().content, "done");
        assert!(events
            .iter()
            .all(|e| !matches!(e, ChatEvent::ToolCallDetected { .. })));

        let second = model.messages_of_call(1);
        let call_turn = second.iter().find(|t| t.has_tool_calls()).unwrap();
        let ids: Vec<&str> = call_turn.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["tc_s"]);
    }

    #[tokio::test]
    async fn test_resumed_tool_turn_precedes_model_call() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("Booked: ABC123")]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let call = ToolCallDescriptor::new("tc_1", "bookFlight", json!({"to": "HND"}));
        let mut request = ChatTurnRequest::text(THREAD, "u1", "Fly me to Tokyo");
        request.client_tools = vec![book_flight_spec()];
        request.tool_calls = vec![call.clone()];
        request.tool_results = vec![ToolResult::ok("tc_1", "bookFlight", json!({"confirmation": "ABC123"}))];

        let (result, _) = run(&orchestrator, request).await;
        assert_eq!(result.unwrap().content, "Booked: ABC123");

        let sent = model.messages_of_call(0);
        let call_pos = sent
            .iter()
            .position(|t| t.role == TurnRole::Assistant && t.tool_calls == vec![call.clone()])
            .unwrap();
        assert_eq!(sent[call_pos + 1].tool_call_id.as_deref(), Some("tc_1"));
        assert_eq!(sent[call_pos - 1], ConversationTurn::user("Fly me to Tokyo"));

        let stored = store.history(THREAD);
        let roles: Vec<TurnRole> = stored.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::User, TurnRole::Assistant, TurnRole::Tool, TurnRole::Assistant]
        );
    }

    #[tokio::test]
    async fn test_resume_without_echoed_calls_rebuilds_them() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("ok")]]));
        let orchestrator = orchestrator(store, model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "");
        request.tool_results = vec![ToolResult::ok("tc_7", "bookFlight", json!(true))];
        run(&orchestrator, request).await.0.unwrap();

        let sent = model.messages_of_call(0);
        let call_turn = sent.iter().find(|t| t.has_tool_calls()).unwrap();
        assert_eq!(call_turn.tool_calls[0].id, "tc_7");
        assert_eq!(call_turn.tool_calls[0].name, "bookFlight");
    }

    #[tokio::test]
    async fn test_client_disconnect_aborts_without_persisting() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("a"), text("b")]]));
        let orchestrator = orchestrator(store.clone(), model);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = orchestrator
            .stream_chat(ChatTurnRequest::text(THREAD, "u1", "hi"), &tx)
            .await;

        assert!(matches!(result, Err(ChatError::ClientDisconnected)));
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_mid_stream() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![
            text("par"),
            Scripted::Fail("connection reset".to_string()),
        ]]));
        let orchestrator = orchestrator(store.clone(), model);

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "hi")).await;

        assert!(matches!(result, Err(ChatError::ModelStream(_))));
        assert_eq!(terminal_count(&events), 0);
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn test_model_unavailable() {
        let store = Arc::new(InMemoryConversationStore::default());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedModel::unavailable()));

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "hi")).await;

        assert!(matches!(result, Err(ChatError::ModelStream(_))));
        assert!(events.is_empty());
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn test_history_is_trimmed_before_each_call() {
        let long = "word ".repeat(200);
        let mut history = Vec::new();
        for _ in 0..10 {
            history.push(ConversationTurn::user(long.clone()));
            history.push(ConversationTurn::assistant(long.clone()));
        }
        let store = Arc::new(InMemoryConversationStore::with_history(THREAD, history));
        let model = Arc::new(ScriptedModel::new(vec![vec![text("ok")]]));
        let config = OrchestratorConfig {
            max_history_tokens: 800,
            ..OrchestratorConfig::default()
        };
        let orchestrator = ChatOrchestrator::new(store, model.clone(), registry(), config);

        run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "latest")).await.0.unwrap();

        let sent = model.messages_of_call(0);
        assert!(sent.len() < 22);
        assert_eq!(sent[0].role, TurnRole::System);
        assert_eq!(sent.last().unwrap(), &ConversationTurn::user("latest"));
        assert!(model.estimate_token_count(&sent) <= 800);
    }

    #[tokio::test]
    async fn test_client_tool_shadowing_server_tool_is_rejected() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("never")]]));
        let orchestrator = orchestrator(store, model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "hi");
        let mut spec = book_flight_spec();
        spec.name = "lookup".to_string();
        request.client_tools = vec![spec];

        let (result, _) = run(&orchestrator, request).await;
        assert!(matches!(result, Err(ChatError::ToolSchema(_))));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_before_the_model() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("orphan")]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let (result, events) = run(&orchestrator, ChatTurnRequest::text(THREAD, "u1", "   ")).await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));

        let mut request = ChatTurnRequest::text(THREAD, "u1", "");
        request.input = ChatInput::Turns(Vec::new());
        let (result, _) = run(&orchestrator, request).await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));

        assert!(events.is_empty());
        assert_eq!(model.call_count(), 0);
        assert_eq!(store.append_count(), 0);
    }

    #[tokio::test]
    async fn test_prepared_turn_runs_with_compiled_tools() {
        let store = Arc::new(InMemoryConversationStore::default());
        let model = Arc::new(ScriptedModel::new(vec![vec![text("ok")]]));
        let orchestrator = orchestrator(store.clone(), model.clone());

        let mut request = ChatTurnRequest::text(THREAD, "u1", "hi");
        request.client_tools = vec![book_flight_spec()];
        let turn = orchestrator.prepare(request).unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let outcome = orchestrator.stream_prepared(turn, &tx).await.unwrap();

        assert_eq!(outcome.content, "ok");
        let names: Vec<String> = model
            .tools_of_call(0)
            .into_iter()
            .map(|schema| schema.name)
            .collect();
        assert_eq!(names, vec!["lookup", "broken", "bookFlight"]);
        assert_eq!(store.history(THREAD).len(), 2);
    }
}
