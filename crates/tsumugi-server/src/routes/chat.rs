//! Chat Routes - Streamed completions and conversation read-back
//!
//! The turn runs in its own task and writes events into a bounded channel;
//! the response body drains that channel as SSE. Dropping the response
//! closes the channel, which the orchestrator treats as a disconnect.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use tsumugi::{ChatEvent, ModelProvider};

use crate::application::{ChatError, ChatTurnOutcome, RequestContext, UsageOptions};
use crate::models::{ChatCompletionRequest, MessagesQuery, MessagesResponse};
use crate::AppState;

const EVENT_BUFFER: usize = 32;

pub(crate) fn require_user(context: &RequestContext) -> Result<String, (StatusCode, String)> {
    context
        .user_id
        .clone()
        .ok_or((StatusCode::UNAUTHORIZED, "No user on request".to_string()))
}

/// Stream a chat turn
///
/// Events: `text_created`, `text_delta`, then one of `text_done`,
/// `tool_call` or `error`.
#[utoipa::path(
    post,
    path = "/chat/completion",
    request_body = ChatCompletionRequest,
    responses(
        (status = 200, description = "SSE stream of chat events", content_type = "text/event-stream"),
        (status = 400, description = "Invalid input or tool declaration"),
        (status = 401, description = "Missing or invalid API key")
    ),
    tag = "Chat"
)]
pub async fn chat_completion(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let user_id = require_user(&context)?;
    let request = payload
        .into_turn_request(user_id)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let thread_id = request.conversation_id.clone();
    let turn = state
        .chat
        .prepare(request)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let (tx, rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);

    tokio::spawn(async move {
        let result = state.chat.stream_prepared(turn, &tx).await;
        match result {
            Ok(outcome) => {
                drop(tx);
                record_usage(&state, &context, &thread_id, outcome).await;
            }
            Err(ChatError::ClientDisconnected) => {
                tracing::info!("Client disconnected from thread {}", thread_id);
            }
            Err(e) => {
                tracing::error!("Chat turn failed for thread {}: {}", thread_id, e);
                let _ = tx
                    .send(ChatEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Usage is priced after the stream has closed and never reaches the client
async fn record_usage(
    state: &AppState,
    context: &RequestContext,
    thread_id: &str,
    outcome: ChatTurnOutcome,
) {
    if outcome.usage.is_empty() {
        return;
    }

    let model = state.chat.model();
    let options = UsageOptions {
        provider: model.provider_name().to_string(),
        model: model.model_id().to_string(),
        metadata: serde_json::json!({ "thread_id": thread_id }),
        ..UsageOptions::default()
    };

    if let Err(e) = state
        .usage
        .record_from_request(context, &outcome.usage, options)
        .await
    {
        tracing::error!("Failed to record usage for thread {}: {}", thread_id, e);
    }
}

/// Stored history of a conversation
#[utoipa::path(
    get,
    path = "/chat/messages",
    params(MessagesQuery),
    responses(
        (status = 200, description = "Conversation turns, oldest first", body = MessagesResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Chat"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, (StatusCode, String)> {
    let turns = state
        .chat
        .history(&query.thread_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(MessagesResponse {
        thread_id: query.thread_id,
        messages: turns.into_iter().map(Into::into).collect(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/completion", post(chat_completion))
        .route("/chat/messages", get(list_messages))
}
