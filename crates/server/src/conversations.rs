//! Conversation API.
//!
//! - `POST   /api/v1/conversations/{conversation_id}/turns`: deliver one user turn
//! - `DELETE /api/v1/conversations/{conversation_id}`: forget the conversation

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use boulanger_agent::{
    KeywordInterruptionDetector, OrderRecognizer, OutboundMessage, Turn, TurnController,
};
use boulanger_core::domain::order::OrderDraft;
use boulanger_core::errors::{ApplicationError, InterfaceError};
use boulanger_core::flows::FoundChoice;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub type SharedController =
    Arc<TurnController<Arc<dyn OrderRecognizer>, KeywordInterruptionDetector>>;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ConversationApiState {
    controller: SharedController,
}

#[derive(Debug, Default, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub choice: Option<FoundChoice>,
    #[serde(default)]
    pub confirmation: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub correlation_id: String,
    pub messages: Vec<OutboundMessage>,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placed_order: Option<OrderDraft>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(controller: SharedController) -> Router {
    Router::new()
        .route("/api/v1/conversations/{conversation_id}/turns", post(post_turn))
        .route("/api/v1/conversations/{conversation_id}", delete(reset_conversation))
        .with_state(ConversationApiState { controller })
}

async fn post_turn(
    Path(conversation_id): Path<String>,
    State(state): State<ConversationApiState>,
    headers: HeaderMap,
    Json(request): Json<TurnRequest>,
) -> ApiResult<Json<TurnResponse>> {
    let correlation_id = correlation_id(&headers);
    let conversation_id = conversation_id.trim().to_string();

    if conversation_id.is_empty() {
        return Err(bad_request("conversation id must not be blank", correlation_id));
    }
    if request.text.trim().is_empty() && request.choice.is_none() && request.confirmation.is_none()
    {
        return Err(bad_request(
            "a turn needs `text`, `choice` or `confirmation`",
            correlation_id,
        ));
    }

    let mut turn = Turn::text(request.text).with_correlation_id(correlation_id.clone());
    turn.choice = request.choice;
    turn.confirmation = request.confirmation;

    info!(
        event_name = "server.turn.received",
        correlation_id = %correlation_id,
        conversation_id = %conversation_id,
        "turn received"
    );

    let reply = state
        .controller
        .resume_or_start(&conversation_id, &turn)
        .await
        .map_err(|error| interface_error(error, &correlation_id))?;

    Ok(Json(TurnResponse {
        conversation_id,
        correlation_id,
        messages: reply.messages,
        state: reply.state.label(),
        placed_order: reply.placed_order.map(|order| order.draft),
    }))
}

async fn reset_conversation(
    Path(conversation_id): Path<String>,
    State(state): State<ConversationApiState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let correlation_id = correlation_id(&headers);
    state
        .controller
        .reset(conversation_id.trim())
        .await
        .map_err(|error| interface_error(error, &correlation_id))?;
    Ok(StatusCode::NO_CONTENT)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

fn bad_request(message: &str, correlation_id: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string(), correlation_id }))
}

fn interface_error(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let error = error.into_interface(correlation_id);
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.turn.failed",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "turn request failed"
    );
    (
        status,
        Json(ApiError {
            error: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use boulanger_agent::{
        KeywordInterruptionDetector, OrderOrchestrator, OrderRecognizer, TurnController,
        UnconfiguredRecognizer,
    };
    use boulanger_db::repositories::{
        InMemoryConversationRepository, InMemoryOrderRepository, OrderRepository,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;

    fn app() -> (Router, Arc<InMemoryOrderRepository>) {
        let recognizer: Arc<dyn OrderRecognizer> = Arc::new(UnconfiguredRecognizer);
        let orders = Arc::new(InMemoryOrderRepository::default());
        let controller = TurnController::new(
            OrderOrchestrator::new(recognizer, KeywordInterruptionDetector::default()),
            Arc::new(InMemoryConversationRepository::default()),
            orders.clone(),
        );
        (router(Arc::new(controller)), orders)
    }

    async fn post_turn(app: &Router, conversation_id: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/conversations/{conversation_id}/turns"))
            .header("content-type", "application/json")
            .header("x-correlation-id", "req-test")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn turn_endpoint_walks_an_order_to_completion() {
        let (app, orders) = app();

        let (status, intro) = post_turn(&app, "web-1", json!({ "text": "hi" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(intro["state"], "collecting_order");
        assert_eq!(intro["correlation_id"], "req-test");
        assert_eq!(intro["messages"][0]["input_hint"], "ignoring_input");
        assert_eq!(intro["messages"][1]["text"], "Which product would you like to order today?");

        for body in [
            json!({ "text": "", "choice": { "value": "Eggs", "index": 5 } }),
            json!({ "text": "12" }),
            json!({ "text": "Standard" }),
            json!({ "text": "free_range" }),
        ] {
            let (status, _) = post_turn(&app, "web-1", body).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, placed) =
            post_turn(&app, "web-1", json!({ "text": "", "confirmation": true })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(placed["placed_order"]["product"], "Eggs");
        assert_eq!(placed["placed_order"]["flavor"], "Free_Range");
        assert_eq!(orders.list_for_conversation("web-1").await.expect("orders").len(), 1);
    }

    #[tokio::test]
    async fn empty_turn_is_rejected() {
        let (app, _) = app();

        let (status, body) = post_turn(&app, "web-2", json!({ "text": "   " })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["correlation_id"], "req-test");
    }

    #[tokio::test]
    async fn reset_forgets_the_conversation() {
        let (app, _) = app();
        post_turn(&app, "web-3", json!({ "text": "hi" })).await;

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/conversations/web-3")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (_, restarted) = post_turn(&app, "web-3", json!({ "text": "Bread" })).await;
        assert_eq!(restarted["messages"][1]["text"], "Which product would you like to order today?");
    }
}
