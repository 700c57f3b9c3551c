//! Core traits and types for the citizen-service desk.
//!
//! This crate provides the shared vocabulary used by every other crate in
//! the workspace. It defines:
//!
//! - [`Brain`] - The model-invocation capability (one completion per call)
//! - [`InboundMessage`] / [`TurnItem`] - Inbound citizen messages and the items
//!   that make up a conversation's working history
//! - [`ToolExecutor`] - Trait for executing the tool calls a model emits
//! - [`ConversationStore`] - Bounded, TTL-evicted per-conversation state
//! - [`BrainError`] - Error types for model calls
//!
//! # Example
//!
//! ```rust
//! use brain_core::{async_trait, Brain, BrainError, Completion, CompletionRequest};
//!
//! struct FixedBrain;
//!
//! #[async_trait]
//! impl Brain for FixedBrain {
//!     async fn complete(&self, _request: CompletionRequest) -> Result<Completion, BrainError> {
//!         Ok(Completion::text("Hello!"))
//!     }
//!
//!     fn name(&self) -> &str {
//!         "FixedBrain"
//!     }
//! }
//! ```

mod completion;
mod error;
mod history;
mod message;
mod prompt;
mod tools;
mod trait_def;

pub use completion::{Completion, CompletionRequest, ResponseFormat, ToolCall};
pub use error::BrainError;
pub use history::{
    bound_history, ConversationState, ConversationStore, Slots, DEFAULT_MAX_CONVERSATIONS,
};
pub use message::{AudioClip, InboundMessage, MessageText, Role, SharedLocation, TurnItem};
pub use prompt::{hash_prompt, short_fingerprint};
pub use tools::{ToolDefinition, ToolExecutor, ToolRequest, ToolRequestMeta, ToolResult};
pub use trait_def::Brain;

// Re-export async_trait for convenience
pub use async_trait::async_trait;
