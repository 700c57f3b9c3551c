//! OpenAI-compatible brain implementation.
//!
//! [`OpenAiBrain`] performs one chat completion per call against any
//! endpoint that speaks the OpenAI chat completions protocol. It supports:
//!
//! - Function calling: tool definitions from the request are offered to the
//!   model and the calls it makes are returned as [`ToolCall`]s
//! - Structured output via `response_format: json_schema`
//! - Image references on user messages
//!
//! # Example
//!
//! ```rust,no_run
//! use openai_brain::{Brain, CompletionRequest, OpenAiBrain, TurnItem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let brain = OpenAiBrain::from_env()?;
//!     let request = CompletionRequest::new("Answer briefly.", vec![TurnItem::user("Hola")]);
//!     let completion = brain.complete(request).await?;
//!     println!("{}", completion.non_empty_text().unwrap_or_default());
//!     Ok(())
//! }
//! ```

mod api_types;
mod brain;
mod config;

pub use brain::OpenAiBrain;
pub use config::{OpenAiBrainConfig, OpenAiBrainConfigBuilder, DEFAULT_API_URL, DEFAULT_MODEL};

// Re-export brain-core types for convenience
pub use brain_core::{
    async_trait, Brain, BrainError, Completion, CompletionRequest, ToolCall, TurnItem,
};
