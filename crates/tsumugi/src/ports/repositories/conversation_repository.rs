//! Conversation Store Port
//!
//! Durable, append-only history per conversation id.

use async_trait::async_trait;

use crate::domain::{errors::DomainError, ConversationTurn};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn after every turn already stored
    async fn append(&self, conversation_id: &str, turn: &ConversationTurn)
        -> Result<(), DomainError>;

    /// Read the full history in insertion order (empty for unknown ids)
    async fn read_all(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>, DomainError>;

    /// Append several turns in order
    async fn append_all(
        &self,
        conversation_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), DomainError> {
        for turn in turns {
            self.append(conversation_id, turn).await?;
        }
        Ok(())
    }
}
