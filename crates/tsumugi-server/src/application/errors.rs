//! Application Errors
//!
//! One error type per boundary. Only `ChatError` ever reaches a chat
//! caller; the others are recovered or logged where they occur.

use thiserror::Error;
use tsumugi::{DomainError, PricingError};

/// Embedding or retrieval backend failure
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to embed query: {0}")]
    Embedding(#[source] DomainError),

    #[error("Failed to load candidates: {0}")]
    Repository(#[source] DomainError),
}

/// A server tool handler failed
#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool {tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("Unknown tool: {0}")]
    Unknown(String),
}

/// A tool declaration could not be compiled
#[derive(Debug, Error, PartialEq)]
pub enum ToolSchemaError {
    #[error("Tool name must not be empty")]
    EmptyName,

    #[error("Tool {tool}: unsupported type '{type_name}' for argument '{field}'")]
    UnsupportedType {
        tool: String,
        field: String,
        type_name: String,
    },

    #[error("Tool {0} is declared more than once")]
    DuplicateName(String),

    #[error("Tool {0} conflicts with a server tool")]
    Conflict(String),
}

/// Turn-level chat failure
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid chat input: {0}")]
    InvalidInput(String),

    #[error("Model stream failed: {0}")]
    ModelStream(#[source] DomainError),

    #[error("Conversation store failed: {0}")]
    Store(#[source] DomainError),

    #[error(transparent)]
    ToolSchema(#[from] ToolSchemaError),

    #[error("Client disconnected")]
    ClientDisconnected,
}

/// Usage recording failed; the chat response is unaffected
#[derive(Debug, Error)]
pub enum UsageError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Failed to store usage record: {0}")]
    Repository(#[source] DomainError),
}
