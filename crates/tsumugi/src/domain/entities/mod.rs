//! Domain Entities
//!
//! Pure domain models without infrastructure dependencies.
//! - ApiKey: billing context of a request
//! - Conversation: role-tagged turns, tool calls and tool results
//! - Document: ingested text and retrievable chunks
//! - Usage: token metering and ledger entries

mod api_key;
mod conversation;
mod document;
mod usage;

pub use api_key::*;
pub use conversation::*;
pub use document::*;
pub use usage::*;
