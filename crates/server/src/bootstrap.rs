use std::sync::Arc;

use boulanger_agent::{
    KeywordInterruptionDetector, LuisRecognizer, OrderOrchestrator, OrderRecognizer,
    RecognitionError, TurnController, UnconfiguredRecognizer,
};
use boulanger_core::config::{AppConfig, ConfigError};
use boulanger_db::repositories::{SqlConversationRepository, SqlOrderRepository};
use boulanger_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::conversations::SharedController;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub controller: SharedController,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language service client could not be built: {0}")]
    Recognizer(#[from] RecognitionError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let recognizer = recognizer_from_config(&config)?;
    let orchestrator = OrderOrchestrator::new(recognizer, KeywordInterruptionDetector::default());
    let controller = TurnController::new(
        orchestrator,
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
    );

    Ok(Application { config, db_pool, controller: Arc::new(controller) })
}

fn recognizer_from_config(config: &AppConfig) -> Result<Arc<dyn OrderRecognizer>, BootstrapError> {
    match LuisRecognizer::from_config(&config.nlu)? {
        Some(recognizer) => {
            info!(
                event_name = "system.bootstrap.nlu_configured",
                correlation_id = "bootstrap",
                prediction_url = %recognizer.prediction_url(),
                "language service configured"
            );
            Ok(Arc::new(recognizer))
        }
        None => {
            warn!(
                event_name = "system.bootstrap.nlu_degraded",
                correlation_id = "bootstrap",
                missing = ?config.nlu.missing_settings(),
                "language service not configured; running without intent recognition"
            );
            Ok(Arc::new(UnconfiguredRecognizer))
        }
    }
}
