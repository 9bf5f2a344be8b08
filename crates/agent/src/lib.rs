//! Conversation runtime for the bakery order assistant.
//!
//! - `nlu`: the language-service collaborator (`OrderRecognizer`) and its LUIS client
//! - `interruption`: cancel/help detection while an order is being collected
//! - `orchestrator`: the Introduce / Interpret / Complete loop around the order flow
//! - `runtime`: `TurnController`, which resumes or starts a conversation per turn
//!
//! The recognizer only pre-fills slots. Which prompt comes next, what counts as a
//! valid answer and when an order is placed are decided by the flow engine in
//! `boulanger-core`.

pub mod interruption;
pub mod nlu;
pub mod orchestrator;
pub mod runtime;

pub use interruption::{InterruptionDetector, KeywordInterruptionDetector};
pub use nlu::{LuisRecognizer, OrderRecognizer, RecognitionError, UnconfiguredRecognizer};
pub use orchestrator::{OrchestratorError, OrderOrchestrator, OutboundMessage, Turn, TurnReply};
pub use runtime::TurnController;
