//! Model Provider Port
//!
//! Abstract interface for streaming chat model invocations.
//! Implementations translate neutral conversation turns into their
//! vendor wire format and back; nothing vendor-specific leaks past here.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;
use crate::domain::{ConversationTurn, ToolCallDescriptor, UsageMetadata};

/// One event of a model's streamed response
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStreamEvent {
    /// Incremental text, in generation order
    TextDelta(String),
    /// Tool calls the model issued; emitted once the calls are complete
    ToolCalls(Vec<ToolCallDescriptor>),
    /// Token usage for this model call
    Usage(UsageMetadata),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelStreamEvent, DomainError>> + Send>>;

/// Function-calling schema offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: serde_json::Value,
}

/// Streaming chat model interface
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Open a response stream for the given history and tools
    async fn stream(
        &self,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> Result<ModelStream, DomainError>;

    /// Get the provider name (e.g., "openai")
    fn provider_name(&self) -> &str;

    /// Get the model ID being used
    fn model_id(&self) -> &str;

    /// Estimate token count for a set of turns
    fn estimate_token_count(&self, messages: &[ConversationTurn]) -> u32 {
        // Rough estimate: ~4 chars per token plus per-message framing
        messages
            .iter()
            .map(|m| {
                let args: usize = m
                    .tool_calls
                    .iter()
                    .map(|c| c.name.len() + c.arguments.to_string().len())
                    .sum();
                ((m.content.len() + args) / 4) as u32 + 4
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct Silent;

    #[async_trait]
    impl ModelProvider for Silent {
        async fn stream(
            &self,
            _messages: &[ConversationTurn],
            _tools: &[ToolSchema],
        ) -> Result<ModelStream, DomainError> {
            Ok(Box::pin(stream::empty()))
        }

        fn provider_name(&self) -> &str {
            "silent"
        }

        fn model_id(&self) -> &str {
            "none"
        }
    }

    #[test]
    fn test_default_estimate() {
        let turns = vec![
            ConversationTurn::user("12345678"),
            ConversationTurn::assistant(""),
        ];
        assert_eq!(Silent.estimate_token_count(&turns), 2 + 4 + 4);
        assert_eq!(Silent.estimate_token_count(&[]), 0);
    }
}
