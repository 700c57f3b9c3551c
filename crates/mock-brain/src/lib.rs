//! Mock brains for testing the service desk without a model.
//!
//! - [`ScriptedBrain`] - Replays queued completions and records every request
//! - [`DelayedBrain`] - Sleeps before delegating, for timeout tests
//!
//! For production use the `openai-brain` crate instead.
//!
//! # Example
//!
//! ```rust
//! use mock_brain::{Brain, CompletionRequest, ScriptedBrain, TurnItem};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mock_brain::BrainError> {
//!     let brain = ScriptedBrain::new()
//!         .then_tool_call("get_debt", json!({ "contract_number": "123456" }))
//!         .then_text("Your balance is $150.00");
//!
//!     let request = CompletionRequest::new("You are a billing assistant", vec![TurnItem::user("balance?")]);
//!     let first = brain.complete(request.clone()).await?;
//!     assert!(first.has_tool_calls());
//!
//!     let second = brain.complete(request).await?;
//!     assert_eq!(second.text.as_deref(), Some("Your balance is $150.00"));
//!     assert_eq!(brain.requests().len(), 2);
//!     Ok(())
//! }
//! ```

mod delayed;
mod scripted;

// Re-export brain-core types for convenience
pub use brain_core::{
    async_trait, Brain, BrainError, Completion, CompletionRequest, ToolCall, TurnItem,
};

pub use delayed::DelayedBrain;
pub use scripted::ScriptedBrain;
