use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::catalog::{find_choice, ChoiceCatalog, ChoiceSet, ProductKind};
use crate::domain::order::{OrderDraft, Slot, NOT_APPLICABLE};
use crate::flows::states::{
    DialogResult, FlowAction, FlowTurn, FlowType, InterruptionSignal, OrderStep, Prompt,
    PromptKind, StepInput, StepResult, SuspendedFlow, TransitionOutcome,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_step(&self) -> OrderStep;
    fn transition(
        &self,
        current: OrderStep,
        draft: &OrderDraft,
        result: &StepResult,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct OnlineOrderFlow {
    catalog: ChoiceCatalog,
}

impl FlowDefinition for OnlineOrderFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::OnlineOrder
    }

    fn initial_step(&self) -> OrderStep {
        OrderStep::Product
    }

    fn transition(
        &self,
        current: OrderStep,
        draft: &OrderDraft,
        result: &StepResult,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_online_order(&self.catalog, current, draft, result)
    }
}

/// Drives a [`FlowDefinition`] across turns. Steps whose slot is already
/// filled are forwarded within the same call; the engine only stops on a
/// prompt or a terminal result.
pub struct FlowEngine<F> {
    flow: F,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FlowProgress {
    turn: FlowTurn,
    transitions: Vec<TransitionOutcome>,
    rejected_input: bool,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_step(&self) -> OrderStep {
        self.flow.initial_step()
    }

    pub fn begin(&self, draft: OrderDraft) -> Result<FlowTurn, FlowTransitionError> {
        self.drive(new_flow_id(), self.flow.initial_step(), draft, StepResult::Empty)
            .map(|progress| progress.turn)
    }

    pub fn resume(
        &self,
        suspended: &SuspendedFlow,
        input: &StepInput,
        signal: InterruptionSignal,
    ) -> Result<FlowTurn, FlowTransitionError> {
        self.resume_progress(suspended, input, signal).map(|progress| progress.turn)
    }

    pub fn begin_with_audit<S>(
        &self,
        draft: OrderDraft,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<FlowTurn, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.drive(new_flow_id(), self.flow.initial_step(), draft, StepResult::Empty);
        emit_progress(&result, sink, audit);
        result.map(|progress| progress.turn)
    }

    pub fn resume_with_audit<S>(
        &self,
        suspended: &SuspendedFlow,
        input: &StepInput,
        signal: InterruptionSignal,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<FlowTurn, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.resume_progress(suspended, input, signal);
        if let Ok(FlowProgress { turn: FlowTurn::Finished(DialogResult::Interrupted(kind)), .. }) =
            &result
        {
            sink.emit(
                audit
                    .event("flow.interrupted", AuditCategory::Flow, AuditOutcome::Rejected)
                    .with_metadata("step", format!("{:?}", suspended.next))
                    .with_metadata("interruption", format!("{kind:?}")),
            );
        }
        if let Ok(FlowProgress { rejected_input: true, .. }) = &result {
            sink.emit(
                audit
                    .event("flow.input_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                    .with_metadata("step", format!("{:?}", suspended.prompt.step))
                    .with_metadata("attempts", (suspended.attempts + 1).to_string()),
            );
        }
        emit_progress(&result, sink, audit);
        result.map(|progress| progress.turn)
    }

    fn resume_progress(
        &self,
        suspended: &SuspendedFlow,
        input: &StepInput,
        signal: InterruptionSignal,
    ) -> Result<FlowProgress, FlowTransitionError> {
        if let Some(interruption) = signal.interruption() {
            return Ok(FlowProgress {
                turn: FlowTurn::Finished(DialogResult::Interrupted(interruption)),
                transitions: Vec::new(),
                rejected_input: false,
            });
        }

        match normalize_input(&suspended.prompt, input) {
            Some(result) => self.drive(
                suspended.flow_id.clone(),
                suspended.next,
                suspended.draft.clone(),
                result,
            ),
            None => Ok(FlowProgress {
                turn: FlowTurn::Suspended(suspended.reprompt()),
                transitions: Vec::new(),
                rejected_input: true,
            }),
        }
    }

    fn drive(
        &self,
        flow_id: String,
        start: OrderStep,
        draft: OrderDraft,
        result: StepResult,
    ) -> Result<FlowProgress, FlowTransitionError> {
        let mut step = start;
        let mut draft = draft;
        let mut result = result;
        let mut transitions = Vec::new();

        loop {
            let outcome = self.flow.transition(step, &draft, &result)?;
            transitions.push(outcome.clone());

            let TransitionOutcome { to, draft: next_draft, action, .. } = outcome;
            match (action, to) {
                (FlowAction::Forward(next_result), Some(next_step)) => {
                    step = next_step;
                    draft = next_draft;
                    result = next_result;
                }
                (FlowAction::Prompt(prompt), Some(next_step)) => {
                    let suspended = SuspendedFlow {
                        flow_id,
                        next: next_step,
                        draft: next_draft,
                        prompt,
                        attempts: 0,
                    };
                    return Ok(FlowProgress {
                        turn: FlowTurn::Suspended(suspended),
                        transitions,
                        rejected_input: false,
                    });
                }
                (FlowAction::Finish(dialog_result), _) => {
                    return Ok(FlowProgress {
                        turn: FlowTurn::Finished(dialog_result),
                        transitions,
                        rejected_input: false,
                    });
                }
                (FlowAction::Forward(_) | FlowAction::Prompt(_), None) => {
                    return Err(FlowTransitionError::InvalidTransition { step, result });
                }
            }
        }
    }
}

impl Default for FlowEngine<OnlineOrderFlow> {
    fn default() -> Self {
        Self::new(OnlineOrderFlow::default())
    }
}

fn new_flow_id() -> String {
    format!("flow-{}", Uuid::new_v4())
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required slots before {step:?}: {missing_slots:?}")]
    MissingRequiredFields { step: OrderStep, missing_slots: Vec<Slot> },
    #[error("invalid transition at {step:?} with result {result:?}")]
    InvalidTransition { step: OrderStep, result: StepResult },
}

fn emit_progress<S>(
    result: &Result<FlowProgress, FlowTransitionError>,
    sink: &S,
    audit: &AuditContext,
) where
    S: AuditSink + ?Sized,
{
    match result {
        Ok(progress) => {
            for outcome in &progress.transitions {
                sink.emit(
                    audit
                        .event("flow.step_applied", AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("from", format!("{:?}", outcome.from))
                        .with_metadata(
                            "to",
                            outcome.to.map(|step| format!("{step:?}")).unwrap_or_default(),
                        )
                        .with_metadata("action", action_label(&outcome.action)),
                );
            }
        }
        Err(error) => {
            sink.emit(
                audit
                    .event("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Failed)
                    .with_metadata("error", error.to_string()),
            );
        }
    }
}

fn action_label(action: &FlowAction) -> &'static str {
    match action {
        FlowAction::Forward(_) => "forward",
        FlowAction::Prompt(_) => "prompt",
        FlowAction::Finish(DialogResult::Completed(_)) => "completed",
        FlowAction::Finish(DialogResult::Declined) => "declined",
        FlowAction::Finish(DialogResult::Interrupted(_)) => "interrupted",
    }
}

fn transition_online_order(
    catalog: &ChoiceCatalog,
    current: OrderStep,
    draft: &OrderDraft,
    result: &StepResult,
) -> Result<TransitionOutcome, FlowTransitionError> {
    let mut draft = draft.clone();

    if let Some(slot) = current.captured_slot() {
        match result {
            StepResult::Value(value) => draft.set(slot, value.clone()),
            StepResult::Empty | StepResult::Confirmation(_) => {
                return Err(FlowTransitionError::InvalidTransition {
                    step: current,
                    result: result.clone(),
                });
            }
        }
    }

    let product = ProductKind::parse(draft.get(Slot::Product).unwrap_or_default());
    let action = match current {
        OrderStep::Product => slot_action(
            current,
            &draft,
            Slot::Product,
            &catalog.products,
            "Which product would you like to order today?",
            "Please pick one of the products we bake.",
        ),
        OrderStep::Quantity => slot_action(
            current,
            &draft,
            Slot::Quantity,
            &catalog.quantities,
            "How many units do you need today?",
            "Please specify the number of units of products.",
        ),
        OrderStep::Size => slot_action(
            current,
            &draft,
            Slot::Size,
            catalog.sizes_for(product),
            "Which size do you prefer most?",
            "Which size do you require?",
        ),
        OrderStep::Flavor => match catalog.flavors_for(product) {
            Some(flavors) => slot_action(
                current,
                &draft,
                Slot::Flavor,
                flavors,
                "Which flavor do you prefer most?",
                "Which flavor do you like the most?",
            ),
            None => match draft.get(Slot::Flavor) {
                Some(flavor) => FlowAction::Forward(StepResult::Value(flavor.to_string())),
                None => FlowAction::Forward(StepResult::Value(NOT_APPLICABLE.to_string())),
            },
        },
        OrderStep::Confirm => {
            let missing_slots = draft.missing_slots();
            if !missing_slots.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    step: current,
                    missing_slots,
                });
            }
            FlowAction::Prompt(Prompt {
                step: current,
                kind: PromptKind::Confirm,
                text: format!(
                    "Please confirm, my order for today is {}. Is this correct?",
                    draft.summary()
                ),
                retry_text: format!("Please answer yes or no: {}?", draft.summary()),
                choices: vec!["Yes".to_string(), "No".to_string()],
            })
        }
        OrderStep::Finalize => match result {
            StepResult::Confirmation(true) => {
                FlowAction::Finish(DialogResult::Completed(draft.clone()))
            }
            StepResult::Confirmation(false) => FlowAction::Finish(DialogResult::Declined),
            StepResult::Empty | StepResult::Value(_) => {
                return Err(FlowTransitionError::InvalidTransition {
                    step: current,
                    result: result.clone(),
                });
            }
        },
    };

    Ok(TransitionOutcome { from: current, to: current.next(), draft, action })
}

fn slot_action(
    step: OrderStep,
    draft: &OrderDraft,
    slot: Slot,
    choices: &ChoiceSet,
    text: &str,
    retry_text: &str,
) -> FlowAction {
    match draft.get(slot) {
        Some(value) => {
            let value = choices.find(value).unwrap_or(value);
            FlowAction::Forward(StepResult::Value(value.to_string()))
        }
        None => FlowAction::Prompt(Prompt {
            step,
            kind: PromptKind::Choice,
            text: text.to_string(),
            retry_text: retry_text.to_string(),
            choices: choices.choices.clone(),
        }),
    }
}

/// Maps a raw answer onto the result type the waiting prompt expects.
/// `None` means the answer does not fit and the prompt should be repeated.
pub fn normalize_input(prompt: &Prompt, input: &StepInput) -> Option<StepResult> {
    match (prompt.kind, input) {
        (PromptKind::Choice, StepInput::Text(text)) => match_choice(&prompt.choices, text),
        (PromptKind::Choice, StepInput::Choice(found)) => {
            match_choice(&prompt.choices, &found.value)
        }
        (PromptKind::Choice, StepInput::Confirmation(_)) => None,
        (PromptKind::Confirm, StepInput::Confirmation(confirmed)) => {
            Some(StepResult::Confirmation(*confirmed))
        }
        (PromptKind::Confirm, StepInput::Text(text)) => {
            parse_confirmation(text).map(StepResult::Confirmation)
        }
        (PromptKind::Confirm, StepInput::Choice(found)) => {
            parse_confirmation(&found.value).map(StepResult::Confirmation)
        }
    }
}

fn match_choice(choices: &[String], candidate: &str) -> Option<StepResult> {
    find_choice(choices, candidate).map(|choice| StepResult::Value(choice.to_string()))
}

fn parse_confirmation(text: &str) -> Option<bool> {
    let normalized = text.trim().trim_end_matches(['.', '!']).to_ascii_lowercase();
    match normalized.as_str() {
        "yes" | "y" | "yeah" | "yep" | "yup" | "sure" | "ok" | "okay" | "correct" | "confirm"
        | "true" => Some(true),
        "no" | "n" | "nope" | "nah" | "incorrect" | "false" => Some(false),
        _ => None,
    }
}
