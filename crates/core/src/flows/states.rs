use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderDraft, Slot};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    OnlineOrder,
}

/// Ordered stages of the order-collection flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStep {
    Product,
    Quantity,
    Size,
    Flavor,
    Confirm,
    Finalize,
}

impl OrderStep {
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Product => Some(Self::Quantity),
            Self::Quantity => Some(Self::Size),
            Self::Size => Some(Self::Flavor),
            Self::Flavor => Some(Self::Confirm),
            Self::Confirm => Some(Self::Finalize),
            Self::Finalize => None,
        }
    }

    /// Slot written from the previous step's result when this step runs.
    pub fn captured_slot(&self) -> Option<Slot> {
        match self {
            Self::Product | Self::Finalize => None,
            Self::Quantity => Some(Slot::Product),
            Self::Size => Some(Slot::Quantity),
            Self::Flavor => Some(Slot::Size),
            Self::Confirm => Some(Slot::Flavor),
        }
    }
}

/// Structured answer produced by a choice widget (button, card action).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundChoice {
    pub value: String,
    #[serde(default)]
    pub index: usize,
}

/// Raw answer to a suspended prompt, as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInput {
    Text(String),
    Choice(FoundChoice),
    Confirmation(bool),
}

/// Normalized result flowing from one step into the next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepResult {
    Empty,
    Value(String),
    Confirmation(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputHint {
    ExpectingInput,
    IgnoringInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Choice,
    Confirm,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub step: OrderStep,
    pub kind: PromptKind,
    pub text: String,
    pub retry_text: String,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// Engine position between turns: the step that will receive the next answer,
/// the draft collected so far, and the prompt that is waiting on the user.
/// `flow_id` is fixed when the flow begins and names the order it collects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendedFlow {
    #[serde(default)]
    pub flow_id: String,
    pub next: OrderStep,
    pub draft: OrderDraft,
    pub prompt: Prompt,
    #[serde(default)]
    pub attempts: u32,
}

impl SuspendedFlow {
    /// Text to show the user; re-prompts use the retry wording.
    pub fn message(&self) -> &str {
        if self.attempts == 0 {
            &self.prompt.text
        } else {
            &self.prompt.retry_text
        }
    }

    pub fn reprompt(&self) -> Self {
        Self { attempts: self.attempts.saturating_add(1), ..self.clone() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionSignal {
    Continue,
    Cancelled,
    HelpRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interruption {
    Cancelled,
    HelpRequested,
}

impl InterruptionSignal {
    pub fn interruption(&self) -> Option<Interruption> {
        match self {
            Self::Continue => None,
            Self::Cancelled => Some(Interruption::Cancelled),
            Self::HelpRequested => Some(Interruption::HelpRequested),
        }
    }
}

/// Terminal value of the order flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogResult {
    Completed(OrderDraft),
    Declined,
    Interrupted(Interruption),
}

impl DialogResult {
    pub fn order(&self) -> Option<&OrderDraft> {
        match self {
            Self::Completed(draft) => Some(draft),
            Self::Declined | Self::Interrupted(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    /// Slot already filled; continue with the next step in the same turn.
    Forward(StepResult),
    /// Suspend and wait for the user's answer.
    Prompt(Prompt),
    Finish(DialogResult),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: OrderStep,
    pub to: Option<OrderStep>,
    pub draft: OrderDraft,
    pub action: FlowAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowTurn {
    Suspended(SuspendedFlow),
    Finished(DialogResult),
}

/// Orchestrator position between turns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    AwaitingUtterance { restart: bool },
    CollectingOrder { flow: SuspendedFlow },
}

impl ConversationState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingUtterance { .. } => "awaiting_utterance",
            Self::CollectingOrder { .. } => "collecting_order",
        }
    }
}
