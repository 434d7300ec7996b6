//! OpenAI adapters for the model and embedding ports

mod chat;
mod embedding;

pub use chat::OpenAiChatProvider;
pub use embedding::{OpenAiEmbeddingService, DEFAULT_EMBEDDING_MODEL};
