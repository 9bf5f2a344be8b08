//! Top-level conversation loop.
//!
//! A conversation cycles through three stages: `Introduce` greets the user
//! (or, without a language service, starts collecting an order right away),
//! `Interpret` sends the next utterance to the recognizer and seeds the order
//! flow with whatever entities it found, and `Complete` acknowledges a placed
//! order before going back to `Introduce` with the restart wording. The loop
//! runs inside a single turn until it needs user input again.

use std::sync::Arc;

use boulanger_core::audit::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, TracingAuditSink,
};
use boulanger_core::domain::order::{OrderDraft, PlacedOrder, Slot};
use boulanger_core::errors::{ApplicationError, DomainError};
use boulanger_core::flows::{
    ConversationState, DialogResult, FlowEngine, FlowTransitionError, FlowTurn, FoundChoice,
    InputHint, OnlineOrderFlow, StepInput, SuspendedFlow,
};
use boulanger_core::recognizer::{extract_order_entities, RecognizerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::interruption::{interruption_message, InterruptionDetector};
use crate::nlu::{OrderRecognizer, RecognitionError};

pub const GREETING_MESSAGE: &str =
    "Say something like \"I need 2 small packets brown bread\" or just say \"Order\"";
pub const RESTART_MESSAGE: &str =
    "Please explore other available products at Boulanger. What else can I do for you?";
pub const DEGRADED_NOTE: &str = "NOTE: the language service is not configured. To enable all \
capabilities, set `applicationId`, `endpointKey` and `endpoint` in the `nlu` configuration.";
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, I couldn't reach the language service just now. Please try again in a moment.";

/// One inbound user turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub text: String,
    pub choice: Option<FoundChoice>,
    pub confirmation: Option<bool>,
    pub correlation_id: String,
}

impl Turn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choice: None,
            confirmation: None,
            correlation_id: format!("turn-{}", Uuid::new_v4()),
        }
    }

    pub fn with_choice(mut self, choice: FoundChoice) -> Self {
        self.choice = Some(choice);
        self
    }

    pub fn with_confirmation(mut self, confirmed: bool) -> Self {
        self.confirmation = Some(confirmed);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Structured answers take precedence over free text.
    pub fn step_input(&self) -> StepInput {
        if let Some(confirmed) = self.confirmation {
            StepInput::Confirmation(confirmed)
        } else if let Some(choice) = &self.choice {
            StepInput::Choice(choice.clone())
        } else {
            StepInput::Text(self.text.clone())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub input_hint: InputHint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl OutboundMessage {
    pub fn ignoring(text: impl Into<String>) -> Self {
        Self { text: text.into(), input_hint: InputHint::IgnoringInput, choices: Vec::new() }
    }

    pub fn expecting(text: impl Into<String>) -> Self {
        Self { text: text.into(), input_hint: InputHint::ExpectingInput, choices: Vec::new() }
    }

    fn prompt(flow: &SuspendedFlow) -> Self {
        Self {
            text: flow.message().to_string(),
            input_hint: InputHint::ExpectingInput,
            choices: flow.prompt.choices.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub messages: Vec<OutboundMessage>,
    pub state: ConversationState,
    /// Set when this turn confirmed an order.
    pub placed_order: Option<PlacedOrder>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

impl From<OrchestratorError> for ApplicationError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Recognizer(error) => DomainError::from(error).into(),
            OrchestratorError::Flow(error) => DomainError::from(error).into(),
        }
    }
}

enum Stage {
    Introduce { restart: bool },
    Interpret,
    Complete { result: Option<DialogResult>, flow_id: Option<String> },
    Wait(ConversationState),
}

pub struct OrderOrchestrator<R, I> {
    recognizer: R,
    interruptions: I,
    engine: FlowEngine<OnlineOrderFlow>,
    audit_sink: Arc<dyn AuditSink>,
}

impl<R, I> OrderOrchestrator<R, I>
where
    R: OrderRecognizer,
    I: InterruptionDetector,
{
    pub fn new(recognizer: R, interruptions: I) -> Self {
        Self {
            recognizer,
            interruptions,
            engine: FlowEngine::default(),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn is_degraded(&self) -> bool {
        !self.recognizer.is_configured()
    }

    /// Advances the conversation by one turn. `state` is what the previous
    /// turn left behind; `None` starts a new conversation at `Introduce`.
    pub async fn handle(
        &self,
        conversation_id: &str,
        state: Option<ConversationState>,
        turn: &Turn,
    ) -> Result<TurnReply, OrchestratorError> {
        let audit = AuditContext::new(
            Some(conversation_id.to_string()),
            turn.correlation_id.clone(),
            "orchestrator",
        );
        let mut messages = Vec::new();
        let mut placed_order = None;

        let mut stage = match state {
            None => Stage::Introduce { restart: false },
            Some(ConversationState::AwaitingUtterance { .. }) => Stage::Interpret,
            Some(ConversationState::CollectingOrder { flow }) => {
                self.continue_order(&flow, turn, &mut messages, &audit)?
            }
        };

        loop {
            stage = match stage {
                Stage::Introduce { restart } => self.introduce(restart, &mut messages, &audit)?,
                Stage::Interpret => self.interpret(turn, &mut messages, &audit).await?,
                Stage::Complete { result, flow_id } => {
                    if let Some(order) = result.as_ref().and_then(DialogResult::order) {
                        let placed = match flow_id.as_deref() {
                            Some(flow_id) => {
                                PlacedOrder::for_flow(conversation_id, flow_id, order.clone())
                            }
                            None => PlacedOrder::new(conversation_id, order.clone()),
                        };
                        let receipt = receipt_message(&placed.draft, placed.placed_at);
                        messages.push(OutboundMessage::ignoring(receipt));
                        self.audit_sink.emit(
                            audit
                                .event("order.placed", AuditCategory::Order, AuditOutcome::Success)
                                .with_metadata("order_id", placed.id.0.clone())
                                .with_metadata("summary", order.summary()),
                        );
                        placed_order = Some(placed);
                    }
                    Stage::Introduce { restart: true }
                }
                Stage::Wait(state) => {
                    info!(
                        event_name = "agent.turn.handled",
                        correlation_id = %audit.correlation_id,
                        conversation_id,
                        state = state.label(),
                        messages = messages.len(),
                        "turn handled"
                    );
                    return Ok(TurnReply { messages, state, placed_order });
                }
            };
        }
    }

    fn introduce(
        &self,
        restart: bool,
        messages: &mut Vec<OutboundMessage>,
        audit: &AuditContext,
    ) -> Result<Stage, OrchestratorError> {
        if !self.recognizer.is_configured() {
            messages.push(OutboundMessage::ignoring(DEGRADED_NOTE));
            return self.begin_order(OrderDraft::new(), messages, audit);
        }

        let text = if restart { RESTART_MESSAGE } else { GREETING_MESSAGE };
        messages.push(OutboundMessage::expecting(text));
        Ok(Stage::Wait(ConversationState::AwaitingUtterance { restart }))
    }

    async fn interpret(
        &self,
        turn: &Turn,
        messages: &mut Vec<OutboundMessage>,
        audit: &AuditContext,
    ) -> Result<Stage, OrchestratorError> {
        if !self.recognizer.is_configured() {
            return self.begin_order(OrderDraft::new(), messages, audit);
        }

        let result = match self.recognizer.recognize(&turn.text).await {
            Ok(result) => result,
            Err(RecognitionError::Malformed(error)) => {
                self.audit_sink.emit(
                    audit
                        .event(
                            "recognition.malformed",
                            AuditCategory::Recognition,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
            Err(RecognitionError::Unavailable(reason)) => {
                warn!(
                    event_name = "agent.nlu.unavailable",
                    correlation_id = %audit.correlation_id,
                    reason = %reason,
                    "language service call failed"
                );
                messages.push(OutboundMessage::ignoring(UNAVAILABLE_MESSAGE));
                return Ok(Stage::Complete { result: None, flow_id: None });
            }
        };

        if !result.is_order() {
            self.audit_sink.emit(
                audit
                    .event(
                        "recognition.unrecognized_intent",
                        AuditCategory::Recognition,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("top_intent", result.top_intent.clone()),
            );
            let apology = unrecognized_intent_message(&result.top_intent);
            messages.push(OutboundMessage::ignoring(apology));
            return Ok(Stage::Complete { result: None, flow_id: None });
        }

        let draft = extract_order_entities(&result)?;
        let prefilled = Slot::ALL.len() - draft.missing_slots().len();
        self.audit_sink.emit(
            audit
                .event("recognition.order_intent", AuditCategory::Recognition, AuditOutcome::Success)
                .with_metadata("prefilled", prefilled.to_string()),
        );
        self.begin_order(draft, messages, audit)
    }

    fn begin_order(
        &self,
        draft: OrderDraft,
        messages: &mut Vec<OutboundMessage>,
        audit: &AuditContext,
    ) -> Result<Stage, OrchestratorError> {
        let turn = self.engine.begin_with_audit(draft, self.audit_sink.as_ref(), audit)?;
        Ok(settle(turn, None, messages))
    }

    fn continue_order(
        &self,
        flow: &SuspendedFlow,
        turn: &Turn,
        messages: &mut Vec<OutboundMessage>,
        audit: &AuditContext,
    ) -> Result<Stage, OrchestratorError> {
        let signal = self.interruptions.detect(&turn.text);
        let next = self.engine.resume_with_audit(
            flow,
            &turn.step_input(),
            signal,
            self.audit_sink.as_ref(),
            audit,
        )?;
        Ok(settle(next, Some(&flow.flow_id), messages))
    }
}

/// `flow_id` names the flow that was resumed, if any.
fn settle(turn: FlowTurn, flow_id: Option<&str>, messages: &mut Vec<OutboundMessage>) -> Stage {
    match turn {
        FlowTurn::Suspended(flow) => {
            messages.push(OutboundMessage::prompt(&flow));
            Stage::Wait(ConversationState::CollectingOrder { flow })
        }
        FlowTurn::Finished(result) => {
            if let DialogResult::Interrupted(interruption) = &result {
                messages.push(OutboundMessage::ignoring(interruption_message(*interruption)));
            }
            Stage::Complete { result: Some(result), flow_id: flow_id.map(str::to_string) }
        }
    }
}

pub fn unrecognized_intent_message(top_intent: &str) -> String {
    format!(
        "Sorry, I didn't get that. Please try asking in a different way (intent was {top_intent})"
    )
}

pub fn receipt_message(order: &OrderDraft, at: DateTime<Utc>) -> String {
    format!(
        "Thank you! We received your order for {} at {}, soon this product will be delivered to you.",
        order.product.as_deref().unwrap_or_default(),
        at.to_rfc2822()
    )
}
