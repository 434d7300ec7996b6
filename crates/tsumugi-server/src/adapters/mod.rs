//! Infrastructure Adapters
//!
//! Implementations of domain ports for external systems.

pub mod openai;
pub mod postgres;

// Re-exports
pub use openai::{OpenAiChatProvider, OpenAiEmbeddingService};
pub use postgres::{PgApiKeyRepository, PgConversationStore, PgDocumentRepository, PgUsageRepository};
