use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Known up-migrations that the database has not recorded as applied.
pub async fn pending_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: Vec<i64> = if tracked == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    };

    Ok(MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .filter(|migration| !applied.contains(&migration.version))
        .count())
}

#[cfg(test)]
mod tests {
    use super::{pending_count, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] =
        &["conversation_state", "placed_order", "idx_placed_order_conversation_id"];

    async fn schema_objects(pool: &sqlx::SqlitePool) -> Vec<String> {
        let mut names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') \
             AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'",
        )
        .fetch_all(pool)
        .await
        .expect("schema query");
        names.sort();
        names
    }

    #[tokio::test]
    async fn migrations_create_managed_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        assert_eq!(pending_count(&pool).await.expect("pending"), 2);
        run_pending(&pool).await.expect("migrations");
        assert_eq!(pending_count(&pool).await.expect("pending"), 0);

        let objects = schema_objects(&pool).await;
        for expected in MANAGED_SCHEMA_OBJECTS {
            assert!(objects.iter().any(|name| name == expected), "{expected} should exist");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent_and_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");

        MIGRATOR.undo(&pool, 0).await.expect("undo");
        let objects = schema_objects(&pool).await;
        for managed in MANAGED_SCHEMA_OBJECTS {
            assert!(!objects.iter().any(|name| name == managed), "{managed} should be dropped");
        }

        run_pending(&pool).await.expect("re-apply");
        assert_eq!(schema_objects(&pool).await.len(), MANAGED_SCHEMA_OBJECTS.len());

        pool.close().await;
    }
}
