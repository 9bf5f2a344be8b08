//! Boulanger core: the order domain, the slot-filling flow engine and the
//! recognizer result model, plus the shared config, error and audit types.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod recognizer;

pub use domain::catalog::{ChoiceCatalog, ChoiceSet, ProductKind};
pub use domain::order::{OrderDraft, OrderId, PlacedOrder, Slot, NOT_APPLICABLE};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ConversationState, DialogResult, FlowEngine, FlowTurn, InputHint, InterruptionSignal,
    OnlineOrderFlow, StepInput, SuspendedFlow,
};
pub use recognizer::{extract_order_entities, RecognizerError, RecognizerResult, ORDER_INTENT};
