use chrono::Utc;

use boulanger_core::flows::ConversationState;

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let stored = sqlx::query_scalar::<_, String>(
            "SELECT state_json FROM conversation_state WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        stored
            .map(|json| {
                serde_json::from_str::<ConversationState>(&json)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))
            })
            .transpose()
    }

    async fn save(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(state)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_state (conversation_id, state_json, updated_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT(conversation_id) DO UPDATE SET \
             state_json = excluded.state_json, updated_at = excluded.updated_at",
        )
        .bind(conversation_id)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_state WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
