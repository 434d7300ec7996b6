//! Tsumugi Domain Library
//!
//! Core domain types and interfaces for the Tsumugi chat backend.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain/`): Pure business entities and logic
//!   - `entities/`: Conversation turns, documents, usage records
//!   - `value_objects/`: Chat events, provider and usage type tags
//!   - `services/`: Token budget trimming, similarity, chunking, pricing
//!   - `errors/`: Domain-specific error types
//!
//! - **Ports** (`ports/`): Abstract interfaces (traits)
//!   - `repositories/`: Conversation, document, usage and API key storage
//!   - `services/`: Streaming model provider and embeddings
//!
//! - **SSE** (`sse`): `data:` line framing shared by the model adapter and the CLI
//!
//! # Usage
//!
//! ```rust,ignore
//! use tsumugi::domain::{ConversationTurn, TokenBudgetTrimmer};
//! use tsumugi::ports::{ConversationStore, ModelProvider};
//! ```

pub mod domain;
pub mod ports;
pub mod sse;

// Re-export commonly used types
pub use domain::{
    ApiKey, ChatEvent, ConversationTurn, CostBreakdown, CostEstimator, Document, DocumentChunk,
    DomainError, ModelPricing, ModelUsage, PricingError, Provider, ScoredChunk,
    TokenBudgetTrimmer, ToolCallDescriptor, ToolResult, TurnRole, UsageMetadata, UsageRecord,
    UsageSummary, UsageTotals, UsageType,
};
pub use ports::{
    // Repositories
    ApiKeyRepository,
    ChunkScope,
    ConversationStore,
    DocumentRepository,
    // Services
    EmbeddingService,
    ModelProvider,
    ModelStream,
    ModelStreamEvent,
    ToolSchema,
    UsageRange,
    UsageRepository,
    UsageScope,
};
