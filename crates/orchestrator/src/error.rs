//! Error types for orchestrator operations.

use brain_core::BrainError;
use thiserror::Error;

/// Errors that can occur while running a turn.
///
/// None of these reach the citizen verbatim: `run_workflow` turns every
/// one of them into a natural-language reply.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The inbound message had no text and no side-channel content.
    #[error("empty message")]
    EmptyMessage,

    /// The classifier produced no usable intent.
    #[error("classification failed: {0}")]
    ClassificationFailed(String),

    /// A model call failed.
    #[error("brain error: {0}")]
    Brain(#[from] BrainError),

    /// A model call exceeded its deadline.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Startup configuration was invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<agent_tools::ToolError> for OrchestratorError {
    fn from(err: agent_tools::ToolError) -> Self {
        OrchestratorError::Configuration(err.to_string())
    }
}
