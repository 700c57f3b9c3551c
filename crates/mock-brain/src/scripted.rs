//! Scripted brain - replays queued completions in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use brain_core::{async_trait, Brain, BrainError, Completion, CompletionRequest, ToolCall};
use serde_json::Value;

/// A brain that answers each call with the next queued step.
///
/// Every request is recorded so tests can assert on the instructions,
/// history and tools a caller sent. Once the script is exhausted, calls
/// fail with [`BrainError::ProcessingFailed`].
#[derive(Debug, Default)]
pub struct ScriptedBrain {
    steps: Mutex<VecDeque<Result<Completion, BrainError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    next_call_id: AtomicUsize,
}

impl ScriptedBrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a completion.
    pub fn then(self, completion: Completion) -> Self {
        self.push(Ok(completion));
        self
    }

    /// Queue a text reply.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(Completion::text(text))
    }

    /// Queue a single tool call.
    pub fn then_tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        let id = format!("call_{}", self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.then(Completion::tool_calls(vec![ToolCall::new(
            id,
            name,
            arguments.to_string(),
        )]))
    }

    /// Queue a JSON object reply, as a structured-output call would return.
    pub fn then_json(self, value: Value) -> Self {
        self.then_text(value.to_string())
    }

    /// Queue a failure.
    pub fn then_error(self, error: BrainError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, step: Result<Completion, BrainError>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BrainError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let step = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        step.unwrap_or_else(|| {
            Err(BrainError::ProcessingFailed(
                "script exhausted".to_string(),
            ))
        })
    }

    fn name(&self) -> &str {
        "ScriptedBrain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::TurnItem;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new("instructions", vec![TurnItem::user("hola")])
    }

    #[tokio::test]
    async fn test_replays_in_order() {
        let brain = ScriptedBrain::new()
            .then_tool_call("get_debt", json!({ "contract_number": "1" }))
            .then_text("listo");

        let first = brain.complete(request()).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "get_debt");
        assert_eq!(first.tool_calls[0].id, "call_1");

        let second = brain.complete(request()).await.unwrap();
        assert_eq!(second.text.as_deref(), Some("listo"));
        assert_eq!(brain.remaining(), 0);
    }

    #[tokio::test]
    async fn test_records_requests() {
        let brain = ScriptedBrain::new().then_text("ok");
        brain.complete(request()).await.unwrap();

        let recorded = brain.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].instructions, "instructions");
    }

    #[tokio::test]
    async fn test_exhausted_and_errors() {
        let brain = ScriptedBrain::new().then_error(BrainError::Timeout);
        assert!(matches!(
            brain.complete(request()).await,
            Err(BrainError::Timeout)
        ));
        assert!(matches!(
            brain.complete(request()).await,
            Err(BrainError::ProcessingFailed(_))
        ));
    }
}
