//! File Routes - Document search, ingestion and document chat

use axum::{extract::State, http::StatusCode, routing::post, Extension, Json, Router};

use tsumugi::{DomainError, ModelProvider};

use super::chat::require_user;
use crate::application::{
    clamp_top_k, ChatError, DocumentChatRequest, IngestRequest, RequestContext, RetrievalError,
    UsageOptions, DEFAULT_TOP_K,
};
use crate::models::{
    FileChatRequest, FileChatResponse, FileQueryRequest, FileQueryResponse,
    IngestDocumentRequest, IngestDocumentResponse,
};
use crate::AppState;

/// Search the caller's documents
#[utoipa::path(
    post,
    path = "/file/query",
    request_body = FileQueryRequest,
    responses(
        (status = 200, description = "Most similar chunks first", body = FileQueryResponse),
        (status = 400, description = "Empty query"),
        (status = 502, description = "Embedding or storage backend failed")
    ),
    tag = "File"
)]
pub async fn query_files(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<FileQueryRequest>,
) -> Result<Json<FileQueryResponse>, (StatusCode, String)> {
    let user_id = require_user(&context)?;
    if payload.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    let top_k = payload
        .top_k
        .filter(|k| *k != 0)
        .map(clamp_top_k)
        .unwrap_or(DEFAULT_TOP_K);

    let results = state
        .retriever
        .search(&user_id, payload.thread_id.as_deref(), payload.query.trim(), top_k)
        .await
        .map_err(|e| match e {
            RetrievalError::Embedding(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
            RetrievalError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    Ok(Json(FileQueryResponse {
        results: results.into_iter().map(Into::into).collect(),
    }))
}

/// Ingest plain text as a searchable document
#[utoipa::path(
    post,
    path = "/file/ingest",
    request_body = IngestDocumentRequest,
    responses(
        (status = 200, description = "Document stored", body = IngestDocumentResponse),
        (status = 400, description = "Empty text or invalid chunking"),
        (status = 502, description = "Embedding backend failed"),
        (status = 500, description = "Internal server error")
    ),
    tag = "File"
)]
pub async fn ingest_file(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<IngestDocumentRequest>,
) -> Result<Json<IngestDocumentResponse>, (StatusCode, String)> {
    let user_id = require_user(&context)?;

    let (document, chunk_count) = state
        .documents
        .ingest(IngestRequest {
            user_id,
            thread_id: payload.thread_id,
            title: payload.title,
            filename: payload.filename,
            text: payload.text,
            chunk_size: payload.chunk_size,
            chunk_overlap: payload.chunk_overlap,
        })
        .await
        .map_err(|e| match e {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            DomainError::ExternalService(_) | DomainError::Timeout(_) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    Ok(Json(IngestDocumentResponse::new(document, chunk_count)))
}

/// Answer a question from the caller's documents
///
/// One search round, then a final answer with citations. Not streamed.
#[utoipa::path(
    post,
    path = "/file/chat",
    request_body = FileChatRequest,
    responses(
        (status = 200, description = "Answer with citations", body = FileChatResponse),
        (status = 400, description = "Empty message"),
        (status = 502, description = "Model backend failed"),
        (status = 500, description = "Internal server error")
    ),
    tag = "File"
)]
pub async fn chat_with_files(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<FileChatRequest>,
) -> Result<Json<FileChatResponse>, (StatusCode, String)> {
    let user_id = require_user(&context)?;
    let thread_id = payload.thread_id.clone();

    let answer = state
        .document_chat
        .answer(DocumentChatRequest {
            user_id,
            thread_id: payload.thread_id,
            message: payload.message,
            top_k: payload.top_k,
        })
        .await
        .map_err(|e| match e {
            ChatError::InvalidInput(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            ChatError::ModelStream(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    if !answer.usage.is_empty() {
        let model = state.document_chat.model();
        let options = UsageOptions {
            provider: model.provider_name().to_string(),
            model: model.model_id().to_string(),
            metadata: serde_json::json!({
                "is_rag": true,
                "top_k": answer.top_k,
                "thread_id": thread_id,
                "num_chunks_returned": answer.previews.len(),
            }),
            ..UsageOptions::default()
        };
        if let Err(e) = state
            .usage
            .record_from_request(&context, &answer.usage, options)
            .await
        {
            tracing::error!("Failed to record document chat usage: {}", e);
        }
    }

    Ok(Json(answer.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/file/query", post(query_files))
        .route("/file/ingest", post(ingest_file))
        .route("/file/chat", post(chat_with_files))
}
