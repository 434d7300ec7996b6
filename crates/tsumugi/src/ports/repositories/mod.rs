//! Repository Ports
//!
//! Abstract interfaces for data persistence operations.

mod api_key_repository;
mod conversation_repository;
mod document_repository;
mod usage_repository;

pub use api_key_repository::*;
pub use conversation_repository::*;
pub use document_repository::*;
pub use usage_repository::*;
