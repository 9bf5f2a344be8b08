pub mod engine;
pub mod states;

pub use engine::{
    normalize_input, FlowDefinition, FlowEngine, FlowTransitionError, OnlineOrderFlow,
};
pub use states::{
    ConversationState, DialogResult, FlowAction, FlowTurn, FlowType, FoundChoice, InputHint,
    Interruption, InterruptionSignal, OrderStep, Prompt, PromptKind, StepInput, StepResult,
    SuspendedFlow, TransitionOutcome,
};
