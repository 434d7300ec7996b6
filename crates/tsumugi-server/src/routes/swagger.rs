//! OpenAPI Documentation
//!
//! Centralized API documentation using utoipa.

use utoipa::OpenApi;

use crate::models::{
    // Chat models
    ChatCompletionRequest,
    ChatInputPayload,
    ClientToolPayload,
    // File models
    FileChatRequest,
    FileChatResponse,
    FileHit,
    FileQueryRequest,
    FileQueryResponse,
    IngestDocumentRequest,
    IngestDocumentResponse,
    InputMessage,
    MessageResponse,
    MessagesResponse,
    SourcePreviewResponse,
    TokenUsageResponse,
    // Usage models
    ModelUsageResponse,
    ToolArgPayload,
    ToolCallPayload,
    ToolResultPayload,
    UsageRecordResponse,
    UsageSummaryResponse,
    UsageTotalsResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Chat endpoints
        super::chat::chat_completion,
        super::chat::list_messages,
        // File endpoints
        super::file::query_files,
        super::file::ingest_file,
        super::file::chat_with_files,
        // Usage endpoints
        super::usage::my_usage,
        super::usage::my_usage_summary,
        super::usage::key_usage,
        super::usage::key_usage_summary,
    ),
    info(
        title = "Tsumugi API",
        version = "0.1.0",
        description = "紡ぎ (Tsumugi) - Streaming chat backend\n\nSpins model output, server tools and document retrieval into one SSE thread.",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Chat", description = "Chat - Streamed completions with tool calling"),
        (name = "File", description = "File - Document ingestion, vector search and document chat"),
        (name = "Usage", description = "Usage - Token metering and cost"),
    ),
    components(
        schemas(
            // Chat
            ChatCompletionRequest,
            ChatInputPayload,
            InputMessage,
            ClientToolPayload,
            ToolArgPayload,
            ToolCallPayload,
            ToolResultPayload,
            MessageResponse,
            MessagesResponse,
            // File
            FileQueryRequest,
            FileHit,
            FileQueryResponse,
            IngestDocumentRequest,
            IngestDocumentResponse,
            FileChatRequest,
            FileChatResponse,
            SourcePreviewResponse,
            TokenUsageResponse,
            // Usage
            UsageRecordResponse,
            UsageTotalsResponse,
            ModelUsageResponse,
            UsageSummaryResponse,
        )
    )
)]
pub struct ApiDoc;
