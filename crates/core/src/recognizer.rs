//! Recognizer results and the mapping from recognized entities to order slots.
//!
//! The NLU service returns LUIS-style payloads where every entity type keeps
//! its matched spans under `entities.$instance.<Entity>`. Only the first span
//! of each entity type is used.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::order::{OrderDraft, Slot};

/// Intent that starts the order flow.
pub const ORDER_INTENT: &str = "OrderProduct";

const INSTANCE_KEY: &str = "$instance";

const ENTITY_SLOTS: [(&str, Slot); 4] = [
    ("Product", Slot::Product),
    ("ProductSize", Slot::Size),
    ("ProductFlavors", Slot::Flavor),
    ("number", Slot::Quantity),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizerResult {
    pub text: String,
    pub top_intent: String,
    #[serde(default)]
    pub entities: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecognizerError {
    #[error("malformed recognizer result: {0}")]
    Malformed(String),
}

impl RecognizerResult {
    pub fn new(text: impl Into<String>, top_intent: impl Into<String>, entities: Value) -> Self {
        Self { text: text.into(), top_intent: top_intent.into(), entities }
    }

    pub fn is_order(&self) -> bool {
        self.top_intent == ORDER_INTENT
    }

    /// Parses a LUIS v3 prediction response body.
    pub fn from_luis_v3(body: Value) -> Result<Self, RecognizerError> {
        let text = body.get("query").and_then(Value::as_str).unwrap_or_default().to_string();
        let prediction = body
            .get("prediction")
            .and_then(Value::as_object)
            .ok_or_else(|| RecognizerError::Malformed("missing `prediction` object".to_string()))?;
        let top_intent = prediction
            .get("topIntent")
            .and_then(Value::as_str)
            .ok_or_else(|| RecognizerError::Malformed("missing `prediction.topIntent`".to_string()))?
            .to_string();
        let entities = prediction.get("entities").cloned().unwrap_or(Value::Null);

        Ok(Self { text, top_intent, entities })
    }
}

/// Pulls product, quantity, size and flavor out of a recognizer result.
/// Absent entity types leave the slot unset; a payload that does not follow
/// the `$instance` span layout is rejected.
pub fn extract_order_entities(result: &RecognizerResult) -> Result<OrderDraft, RecognizerError> {
    let mut draft = OrderDraft::new();

    let entities = match &result.entities {
        Value::Null => return Ok(draft),
        Value::Object(entities) if entities.is_empty() => return Ok(draft),
        Value::Object(entities) => entities,
        other => {
            return Err(RecognizerError::Malformed(format!(
                "`entities` must be an object, found {}",
                json_kind(other)
            )))
        }
    };

    let instances = entities.get(INSTANCE_KEY).and_then(Value::as_object).ok_or_else(|| {
        RecognizerError::Malformed(format!("`entities.{INSTANCE_KEY}` object is missing"))
    })?;

    for (entity, slot) in ENTITY_SLOTS {
        if let Some(spans) = instances.get(entity) {
            if let Some(text) = first_span_text(entity, spans)? {
                draft.set(slot, text);
            }
        }
    }

    Ok(draft)
}

fn first_span_text(entity: &str, spans: &Value) -> Result<Option<String>, RecognizerError> {
    let spans = spans.as_array().ok_or_else(|| {
        RecognizerError::Malformed(format!("`{INSTANCE_KEY}.{entity}` must be an array of spans"))
    })?;

    let Some(first) = spans.first() else {
        return Ok(None);
    };

    first
        .get("text")
        .and_then(Value::as_str)
        .map(|text| Some(text.to_string()))
        .ok_or_else(|| {
            RecognizerError::Malformed(format!("`{INSTANCE_KEY}.{entity}[0].text` is not a string"))
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
