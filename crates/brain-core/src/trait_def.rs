//! The Brain trait definition.

use async_trait::async_trait;

use crate::completion::{Completion, CompletionRequest};
use crate::error::BrainError;

/// A model-invocation capability.
///
/// A brain performs exactly one completion per call: given instructions,
/// a working history and an optional toolset, it returns assistant text
/// and/or tool calls. Executing those tool calls and looping is the
/// caller's job. This trait is object-safe and can be used as
/// `Arc<dyn Brain>`.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BrainError>;

    /// Get a human-readable name for this brain implementation.
    fn name(&self) -> &str;

    /// Check if the brain is ready to process requests.
    ///
    /// Default implementation always returns true.
    async fn is_ready(&self) -> bool {
        true
    }
}
