//! PostgreSQL implementation of ConversationStore

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use tsumugi::{ConversationStore, ConversationTurn, DomainError, ToolCallDescriptor, TurnRole};

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    role: String,
    content: String,
    tool_call_id: Option<String>,
    tool_calls: Json<Vec<ToolCallDescriptor>>,
}

impl TryFrom<TurnRow> for ConversationTurn {
    type Error = DomainError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        let role: TurnRole = row.role.parse().map_err(DomainError::Repository)?;
        Ok(Self {
            role,
            content: row.content,
            tool_call_id: row.tool_call_id,
            tool_calls: row.tool_calls.0,
        })
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_turns (conversation_id, role, content, tool_call_id, tool_calls)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(conversation_id)
        .bind(turn.role.to_string())
        .bind(&turn.content)
        .bind(&turn.tool_call_id)
        .bind(Json(&turn.tool_calls))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn read_all(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>, DomainError> {
        let rows = sqlx::query_as::<_, TurnRow>(
            r#"
            SELECT role, content, tool_call_id, tool_calls
            FROM conversation_turns
            WHERE conversation_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::Repository(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Single transaction so a turn's messages land together
    async fn append_all(
        &self,
        conversation_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;

        for turn in turns {
            sqlx::query(
                r#"
                INSERT INTO conversation_turns (conversation_id, role, content, tool_call_id, tool_calls)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(conversation_id)
            .bind(turn.role.to_string())
            .bind(&turn.content)
            .bind(&turn.tool_call_id)
            .bind(Json(&turn.tool_calls))
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::Repository(e.to_string()))
    }
}
