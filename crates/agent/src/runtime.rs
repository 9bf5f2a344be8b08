use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use boulanger_core::errors::ApplicationError;
use boulanger_db::repositories::{ConversationRepository, OrderRepository, RepositoryError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::interruption::InterruptionDetector;
use crate::nlu::OrderRecognizer;
use crate::orchestrator::{OrderOrchestrator, Turn, TurnReply};

type LockMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Resumes the stored conversation for each inbound turn, or starts one.
///
/// Turns for the same conversation are serialized behind a per-conversation
/// lock, so at most one orchestrator run is active per conversation. Lock
/// entries live only while a turn holds or waits for them. State is only
/// written back once a turn has been handled successfully.
pub struct TurnController<R, I> {
    orchestrator: OrderOrchestrator<R, I>,
    conversations: Arc<dyn ConversationRepository>,
    orders: Arc<dyn OrderRepository>,
    locks: LockMap,
}

impl<R, I> TurnController<R, I>
where
    R: OrderRecognizer,
    I: InterruptionDetector,
{
    pub fn new(
        orchestrator: OrderOrchestrator<R, I>,
        conversations: Arc<dyn ConversationRepository>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        Self { orchestrator, conversations, orders, locks: StdMutex::new(HashMap::new()) }
    }

    pub fn orchestrator(&self) -> &OrderOrchestrator<R, I> {
        &self.orchestrator
    }

    pub async fn resume_or_start(
        &self,
        conversation_id: &str,
        turn: &Turn,
    ) -> Result<TurnReply, ApplicationError> {
        let _lease = self.lease(conversation_id).await;

        let state = self.conversations.load(conversation_id).await.map_err(persistence)?;
        info!(
            event_name = "agent.turn.received",
            correlation_id = %turn.correlation_id,
            conversation_id,
            resumed = state.is_some(),
            "inbound turn"
        );

        let reply = match self.orchestrator.handle(conversation_id, state, turn).await {
            Ok(reply) => reply,
            Err(failure) => {
                error!(
                    event_name = "agent.turn.failed",
                    correlation_id = %turn.correlation_id,
                    conversation_id,
                    error = %failure,
                    "turn failed; conversation state left unchanged"
                );
                return Err(failure.into());
            }
        };

        // Recording is keyed by the order id, so a turn retried after a failed
        // save does not place the order twice.
        if let Some(placed) = &reply.placed_order {
            self.orders.record(placed.clone()).await.map_err(persistence)?;
            info!(
                event_name = "agent.order.recorded",
                correlation_id = %turn.correlation_id,
                conversation_id,
                order_id = %placed.id.0,
                "order recorded"
            );
        }

        self.conversations.save(conversation_id, &reply.state).await.map_err(persistence)?;
        Ok(reply)
    }

    /// Forgets the stored state; the next turn starts a new conversation.
    pub async fn reset(&self, conversation_id: &str) -> Result<(), ApplicationError> {
        let _lease = self.lease(conversation_id).await;
        self.conversations.clear(conversation_id).await.map_err(persistence)
    }

    async fn lease(&self, conversation_id: &str) -> ConversationLease<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        ConversationLease {
            locks: &self.locks,
            conversation_id: conversation_id.to_string(),
            guard: Some(guard),
        }
    }
}

/// Holds a conversation's turn lock; dropping it releases the lock and
/// removes the map entry once nobody else is waiting on it.
struct ConversationLease<'a> {
    locks: &'a LockMap,
    conversation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        let idle = locks.get(&self.conversation_id).is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.conversation_id);
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use boulanger_core::errors::ApplicationError;
    use boulanger_core::flows::ConversationState;
    use boulanger_core::recognizer::{RecognizerError, RecognizerResult};
    use boulanger_db::repositories::memory::{
        InMemoryConversationRepository, InMemoryOrderRepository,
    };
    use boulanger_db::repositories::{ConversationRepository, OrderRepository, RepositoryError};

    use super::TurnController;
    use crate::interruption::KeywordInterruptionDetector;
    use crate::nlu::{OrderRecognizer, RecognitionError, UnconfiguredRecognizer};
    use crate::orchestrator::{OrderOrchestrator, Turn, DEGRADED_NOTE};

    struct BrokenRecognizer;

    #[async_trait]
    impl OrderRecognizer for BrokenRecognizer {
        fn is_configured(&self) -> bool {
            true
        }

        async fn recognize(&self, _utterance: &str) -> Result<RecognizerResult, RecognitionError> {
            Err(RecognizerError::Malformed("missing `$instance`".to_string()).into())
        }
    }

    /// Conversation store whose next `save` can be made to fail once.
    #[derive(Default)]
    struct FlakySaveRepository {
        inner: InMemoryConversationRepository,
        fail_next_save: AtomicBool,
    }

    #[async_trait]
    impl ConversationRepository for FlakySaveRepository {
        async fn load(
            &self,
            conversation_id: &str,
        ) -> Result<Option<ConversationState>, RepositoryError> {
            self.inner.load(conversation_id).await
        }

        async fn save(
            &self,
            conversation_id: &str,
            state: &ConversationState,
        ) -> Result<(), RepositoryError> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Decode("state write rejected".to_string()));
            }
            self.inner.save(conversation_id, state).await
        }

        async fn clear(&self, conversation_id: &str) -> Result<(), RepositoryError> {
            self.inner.clear(conversation_id).await
        }
    }

    fn tracked_locks<R, I>(controller: &TurnController<R, I>) -> usize {
        controller.locks.lock().expect("lock map").len()
    }

    fn controller<R: OrderRecognizer>(
        recognizer: R,
    ) -> (
        TurnController<R, KeywordInterruptionDetector>,
        Arc<InMemoryConversationRepository>,
        Arc<InMemoryOrderRepository>,
    ) {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let controller = TurnController::new(
            OrderOrchestrator::new(recognizer, KeywordInterruptionDetector::default()),
            conversations.clone(),
            orders.clone(),
        );
        (controller, conversations, orders)
    }

    #[tokio::test]
    async fn first_turn_starts_and_persists_a_conversation() {
        let (controller, conversations, _) = controller(UnconfiguredRecognizer);

        let reply = controller.resume_or_start("conv-1", &Turn::text("hello")).await.expect("turn");

        assert_eq!(reply.messages[0].text, DEGRADED_NOTE);
        let stored = conversations.load("conv-1").await.expect("load");
        assert_eq!(stored, Some(reply.state));
    }

    #[tokio::test]
    async fn confirmed_order_is_recorded_once() {
        let (controller, _, orders) = controller(UnconfiguredRecognizer);

        for text in ["order", "Pastries", "6", "large", "vanilla"] {
            controller.resume_or_start("conv-2", &Turn::text(text)).await.expect("turn");
        }
        let reply = controller.resume_or_start("conv-2", &Turn::text("yes")).await.expect("confirm");

        assert!(reply.placed_order.is_some());
        let recorded = orders.list_for_conversation("conv-2").await.expect("list");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].draft.product.as_deref(), Some("Pastries"));
        assert_eq!(recorded[0].draft.flavor.as_deref(), Some("Vanilla"));
        assert!(orders.list_for_conversation("conv-other").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn confirmation_retried_after_failed_save_places_one_order() {
        let conversations = Arc::new(FlakySaveRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let controller = TurnController::new(
            OrderOrchestrator::new(UnconfiguredRecognizer, KeywordInterruptionDetector::default()),
            conversations.clone(),
            orders.clone(),
        );
        for text in ["order", "Bread", "2", "small", "Brown"] {
            controller.resume_or_start("conv-6", &Turn::text(text)).await.expect("turn");
        }

        conversations.fail_next_save.store(true, Ordering::SeqCst);
        let error = controller
            .resume_or_start("conv-6", &Turn::text("yes"))
            .await
            .expect_err("state save fails");
        assert!(matches!(error, ApplicationError::Persistence(_)));

        let retried =
            controller.resume_or_start("conv-6", &Turn::text("yes")).await.expect("retry");
        let placed = retried.placed_order.expect("order placed on retry");

        let recorded = orders.list_for_conversation("conv-6").await.expect("list");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, placed.id);
        assert!(matches!(
            conversations.load("conv-6").await.expect("load"),
            Some(ConversationState::CollectingOrder { .. })
        ));
    }

    #[tokio::test]
    async fn failed_turn_leaves_stored_state_untouched() {
        let (controller, conversations, _) = controller(BrokenRecognizer);
        let waiting = ConversationState::AwaitingUtterance { restart: false };
        conversations.save("conv-3", &waiting).await.expect("seed");

        let error = controller
            .resume_or_start("conv-3", &Turn::text("bread"))
            .await
            .expect_err("malformed recognizer result");

        assert!(matches!(error, ApplicationError::Domain(_)));
        assert_eq!(conversations.load("conv-3").await.expect("load"), Some(waiting));
    }

    #[tokio::test]
    async fn concurrent_turns_for_one_conversation_are_serialized() {
        let (controller, conversations, _) = controller(UnconfiguredRecognizer);
        let controller = Arc::new(controller);
        controller.resume_or_start("conv-4", &Turn::text("order")).await.expect("intro");

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.resume_or_start("conv-4", &Turn::text("Bun")).await })
        };
        let second = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.resume_or_start("conv-4", &Turn::text("2")).await })
        };
        let first = first.await.expect("join").expect("turn");
        let second = second.await.expect("join").expect("turn");

        let stored = conversations.load("conv-4").await.expect("load").expect("stored state");
        assert!(stored == first.state || stored == second.state);
        // The later turn resumed from the earlier turn's state, not the intro state.
        assert_ne!(first.state, second.state);
    }

    #[tokio::test]
    async fn reset_clears_the_conversation() {
        let (controller, conversations, _) = controller(UnconfiguredRecognizer);
        controller.resume_or_start("conv-5", &Turn::text("order")).await.expect("turn");

        controller.reset("conv-5").await.expect("reset");

        assert_eq!(conversations.load("conv-5").await.expect("load"), None);
    }

    #[tokio::test]
    async fn lock_entries_do_not_outlive_their_turns() {
        let (controller, _, _) = controller(UnconfiguredRecognizer);

        for index in 0..100 {
            let conversation_id = format!("conv-{index}");
            controller.resume_or_start(&conversation_id, &Turn::text("order")).await.expect("turn");
            controller.reset(&conversation_id).await.expect("reset");
        }
        assert_eq!(tracked_locks(&controller), 0);

        let lease = controller.lease("conv-held").await;
        assert_eq!(tracked_locks(&controller), 1);
        drop(lease);
        assert_eq!(tracked_locks(&controller), 0);
    }
}
