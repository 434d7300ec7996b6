//! PostgreSQL Repository Implementations

mod api_key_repository;
mod conversation_repository;
mod document_repository;
mod usage_repository;

pub use api_key_repository::PgApiKeyRepository;
pub use conversation_repository::PgConversationStore;
pub use document_repository::PgDocumentRepository;
pub use usage_repository::PgUsageRepository;
