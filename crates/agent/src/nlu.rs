use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use boulanger_core::config::NluConfig;
use boulanger_core::recognizer::{RecognizerError, RecognizerResult};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("language service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Malformed(#[from] RecognizerError),
}

/// Natural-language collaborator that maps an utterance to an intent and
/// entity spans.
#[async_trait]
pub trait OrderRecognizer: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn recognize(&self, utterance: &str) -> Result<RecognizerResult, RecognitionError>;
}

#[async_trait]
impl<T> OrderRecognizer for Arc<T>
where
    T: OrderRecognizer + ?Sized,
{
    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }

    async fn recognize(&self, utterance: &str) -> Result<RecognizerResult, RecognitionError> {
        (**self).recognize(utterance).await
    }
}

/// Stand-in used when no language service is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredRecognizer;

#[async_trait]
impl OrderRecognizer for UnconfiguredRecognizer {
    fn is_configured(&self) -> bool {
        false
    }

    async fn recognize(&self, _utterance: &str) -> Result<RecognizerResult, RecognitionError> {
        Err(RecognitionError::Unavailable("no language service is configured".to_string()))
    }
}

/// LUIS v3 prediction endpoint client.
pub struct LuisRecognizer {
    client: reqwest::Client,
    endpoint: String,
    application_id: String,
    endpoint_key: SecretString,
}

impl LuisRecognizer {
    /// Returns `None` unless application id, key and endpoint are all present.
    pub fn from_config(config: &NluConfig) -> Result<Option<Self>, RecognitionError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let (Some(endpoint), Some(application_id), Some(endpoint_key)) =
            (config.endpoint_url(), config.application_id.clone(), config.endpoint_key.clone())
        else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| RecognitionError::Unavailable(error.to_string()))?;

        Ok(Some(Self {
            client,
            endpoint,
            application_id: application_id.trim().to_string(),
            endpoint_key,
        }))
    }

    pub fn prediction_url(&self) -> String {
        format!(
            "{}/luis/prediction/v3.0/apps/{}/slots/production/predict",
            self.endpoint, self.application_id
        )
    }
}

#[async_trait]
impl OrderRecognizer for LuisRecognizer {
    fn is_configured(&self) -> bool {
        true
    }

    async fn recognize(&self, utterance: &str) -> Result<RecognizerResult, RecognitionError> {
        let response = self
            .client
            .get(self.prediction_url())
            .query(&[
                ("subscription-key", self.endpoint_key.expose_secret()),
                ("verbose", "true"),
                ("show-all-intents", "true"),
                ("log", "true"),
                ("query", utterance),
            ])
            .send()
            .await
            .map_err(|error| RecognitionError::Unavailable(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::Unavailable(format!(
                "prediction request returned {status}"
            )));
        }

        let body = response.json::<Value>().await.map_err(|error| {
            RecognitionError::Malformed(RecognizerError::Malformed(error.without_url().to_string()))
        })?;
        let result = RecognizerResult::from_luis_v3(body)?;
        debug!(
            event_name = "agent.nlu.recognized",
            top_intent = %result.top_intent,
            "language service returned a prediction"
        );
        Ok(result)
    }
}
