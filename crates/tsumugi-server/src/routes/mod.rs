//! Tsumugi API Routes
//!
//! - /chat/completion - Streamed chat turn (SSE)
//! - /chat/messages - Conversation read-back
//! - /file/query, /file/ingest - Document search and ingestion
//! - /usage, /usage/me - Metering records and summaries

pub mod chat;
pub mod file;
pub mod swagger;
pub mod usage;
