//! Service Ports
//!
//! Abstract interfaces for external services.

mod embedding;
mod llm_provider;

pub use embedding::*;
pub use llm_provider::*;
