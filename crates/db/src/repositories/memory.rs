use std::collections::HashMap;

use tokio::sync::RwLock;

use boulanger_core::domain::order::PlacedOrder;
use boulanger_core::flows::ConversationState;

use super::{ConversationRepository, OrderRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    states: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(conversation_id).cloned())
    }

    async fn save(
        &self,
        conversation_id: &str,
        state: &ConversationState,
    ) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(conversation_id.to_string(), state.clone());
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.remove(conversation_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<PlacedOrder>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn record(&self, order: PlacedOrder) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if !orders.iter().any(|stored| stored.id == order.id) {
            orders.push(order);
        }
        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PlacedOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.iter().filter(|order| order.conversation_id == conversation_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use boulanger_core::domain::order::{OrderDraft, PlacedOrder, Slot};
    use boulanger_core::flows::ConversationState;

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryOrderRepository,
        OrderRepository,
    };

    #[tokio::test]
    async fn in_memory_conversation_repository_round_trip() {
        let repository = InMemoryConversationRepository::default();
        let state = ConversationState::AwaitingUtterance { restart: true };

        repository.save("conv-1", &state).await.expect("save");
        assert_eq!(repository.load("conv-1").await.expect("load"), Some(state));
        assert_eq!(repository.load("conv-2").await.expect("load"), None);

        repository.clear("conv-1").await.expect("clear");
        assert_eq!(repository.load("conv-1").await.expect("load"), None);
    }

    #[tokio::test]
    async fn in_memory_order_repository_filters_by_conversation() {
        let repository = InMemoryOrderRepository::default();
        repository
            .record(PlacedOrder::new("conv-1", OrderDraft::new().with(Slot::Product, "Pizza")))
            .await
            .expect("record");
        repository
            .record(PlacedOrder::new("conv-2", OrderDraft::new().with(Slot::Product, "Bun")))
            .await
            .expect("record");

        let orders = repository.list_for_conversation("conv-1").await.expect("list");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].draft.product.as_deref(), Some("Pizza"));
    }

    #[tokio::test]
    async fn in_memory_order_repository_ignores_repeated_ids() {
        let repository = InMemoryOrderRepository::default();
        let order =
            PlacedOrder::for_flow("conv-1", "flow-9", OrderDraft::new().with(Slot::Product, "Bun"));

        repository.record(order.clone()).await.expect("record");
        repository.record(order).await.expect("record again");

        assert_eq!(repository.list_for_conversation("conv-1").await.expect("list").len(), 1);
    }
}
