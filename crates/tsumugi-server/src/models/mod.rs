//! Tsumugi API Models
//!
//! - Chat: streamed completion requests and stored messages
//! - File: document search and ingestion
//! - Usage: metering records and summaries

mod chat;
mod file;
mod usage;

pub use chat::*;
pub use file::*;
pub use usage::*;
