//! Conversation orchestrator for the water utility's service desk.
//!
//! This crate provides the [`Orchestrator`], the single entry point for an
//! inbound citizen message. Each turn runs:
//!
//! ```text
//! InboundMessage
//!      ↓
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ORCHESTRATOR                          │
//! │                                                              │
//! │  1. Receive: normalize text, annotate location/voice/image   │
//! │         ↓                                                    │
//! │  2. Classify: one Intent + best-effort slots (Classifier)    │
//! │         ↓                                                    │
//! │  3. Route (SpecialistRouter):                                │
//! │     • request-human-agent → urgent ticket, canned reply      │
//! │     • anything else → persona turn with its tool subset      │
//! │         ↓                                                    │
//! │  4. Persist: append user message + turn items (bounded)      │
//! │         ↓                                                    │
//! │  5. Respond: WorkflowOutput                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure still produces a reply; the `error` field of
//! [`WorkflowOutput`] carries the cause for logs.
//!
//! # Example
//!
//! ```rust,ignore
//! use brain_core::InboundMessage;
//! use orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::from_env().await?;
//!     let _sweeper = orchestrator.start_sweeper();
//!
//!     let message = InboundMessage::text("5213312345678", "What's my balance for contract 123456?");
//!     let output = orchestrator.run_workflow(message).await;
//!     println!("[{:?}] {}", output.classification, output.text);
//!     Ok(())
//! }
//! ```

mod classifier;
mod config;
mod enrich;
mod error;
mod intent;
mod orchestrator;
mod persona;
mod runner;

pub use classifier::{
    classification_schema, default_classifier_prompt, format_classifier_input,
    load_classifier_prompt, parse_classification, Classification, Classifier,
    DEFAULT_CLASSIFIER_PROMPT_FILE,
};
pub use config::OrchestratorConfig;
pub use enrich::{compose_user_text, Geocoder, Transcriber};
pub use error::OrchestratorError;
pub use intent::Intent;
pub use orchestrator::{Orchestrator, WorkflowOutput, EMPTY_MESSAGE_REPLY, GENERIC_ERROR_REPLY};
pub use persona::{persona_for, Persona, PersonaKind, Route, SpecialistRouter};
pub use runner::{fallback_text, run_persona_turn, TurnLimits, TurnOutput};

// Re-export for convenience
pub use brain_core::{InboundMessage, Slots};
