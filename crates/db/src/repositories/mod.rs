use async_trait::async_trait;
use thiserror::Error;

use boulanger_core::domain::order::PlacedOrder;
use boulanger_core::flows::ConversationState;

pub mod conversation;
pub mod memory;
pub mod order;

pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemoryOrderRepository};
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Holds the suspended dialog position of each conversation between turns.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn load(&self, conversation_id: &str)
        -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), RepositoryError>;
    async fn clear(&self, conversation_id: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a confirmed order. Recording an id that is already stored is a no-op.
    async fn record(&self, order: PlacedOrder) -> Result<(), RepositoryError>;
    async fn list_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PlacedOrder>, RepositoryError>;
}
