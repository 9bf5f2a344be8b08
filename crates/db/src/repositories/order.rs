use chrono::{DateTime, Utc};
use sqlx::Row;

use boulanger_core::domain::order::{OrderDraft, OrderId, PlacedOrder};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn record(&self, order: PlacedOrder) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO placed_order \
             (id, conversation_id, product, quantity, size, flavor, placed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&order.id.0)
        .bind(&order.conversation_id)
        .bind(&order.draft.product)
        .bind(&order.draft.quantity)
        .bind(&order.draft.size)
        .bind(&order.draft.flavor)
        .bind(order.placed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<PlacedOrder>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, product, quantity, size, flavor, placed_at \
             FROM placed_order WHERE conversation_id = ? ORDER BY placed_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PlacedOrder, RepositoryError> {
                let placed_at: String = row.try_get("placed_at")?;
                let placed_at = DateTime::parse_from_rfc3339(&placed_at)
                    .map_err(|error| RepositoryError::Decode(error.to_string()))?
                    .with_timezone(&Utc);

                Ok(PlacedOrder {
                    id: OrderId(row.try_get("id")?),
                    conversation_id: row.try_get("conversation_id")?,
                    draft: OrderDraft {
                        product: row.try_get("product")?,
                        quantity: row.try_get("quantity")?,
                        size: row.try_get("size")?,
                        flavor: row.try_get("flavor")?,
                    },
                    placed_at,
                })
            })
            .collect()
    }
}
