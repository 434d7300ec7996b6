//! Application Layer (Use Cases)
//!
//! Orchestrates domain operations and coordinates between
//! repositories and external services.

mod chat_orchestrator;
mod document_chat;
mod document_service;
mod errors;
mod file_search_tool;
mod retrieval_service;
mod tool_registry;
mod usage_recorder;

#[cfg(test)]
mod test_support;

pub use chat_orchestrator::{
    ChatInput, ChatOrchestrator, ChatTurnOutcome, ChatTurnRequest, OrchestratorConfig,
};
pub use document_chat::{DocumentAnswer, DocumentChat, DocumentChatRequest, SourcePreview};
pub use document_service::{DocumentService, IngestRequest};
pub use errors::{ChatError, RetrievalError, ToolExecutionError, ToolSchemaError, UsageError};
pub use file_search_tool::{FileSearchHit, FileSearchTool, FILE_SEARCH_TOOL};
pub use retrieval_service::{clamp_top_k, VectorRetriever, DEFAULT_TOP_K};
pub use tool_registry::{ClientArgSpec, ClientToolSpec, ServerTool, ToolContext, ToolRegistry};
pub use usage_recorder::{
    RecordedUsage, RequestContext, UsageOptions, UsageRecorder, DEFAULT_USAGE_MODEL,
};
