//! One persona turn: model calls interleaved with tool executions.

use std::time::Duration;

use brain_core::{
    Brain, CompletionRequest, ToolExecutor, ToolRequest, ToolRequestMeta, ToolResult, TurnItem,
};
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;
use crate::persona::Persona;

/// Bounds applied to a persona turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    /// Model calls that may request tools before the turn is cut off.
    pub max_tool_rounds: usize,
    /// Deadline for each model call.
    pub model_timeout: Duration,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: 6,
            model_timeout: Duration::from_secs(45),
        }
    }
}

/// What a persona turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutput {
    /// New items, in order: tool calls, tool outputs, assistant messages.
    pub items: Vec<TurnItem>,
    /// Final reply text (may be empty).
    pub text: String,
    /// Names of the tools called, in call order.
    pub tools_invoked: Vec<String>,
}

/// Run `persona` over `history` (which already ends with the user message).
///
/// Tool calls are executed sequentially, in the order the model emitted
/// them. If the model keeps calling tools past `max_tool_rounds`, the turn
/// ends and the reply falls back to the last assistant text produced.
pub async fn run_persona_turn(
    brain: &dyn Brain,
    persona: &Persona,
    executor: &dyn ToolExecutor,
    history: &[TurnItem],
    meta: &ToolRequestMeta,
    limits: TurnLimits,
) -> Result<TurnOutput, OrchestratorError> {
    let tools = executor.definitions();
    let mut working = history.to_vec();
    let mut items = Vec::new();

    for round in 0..=limits.max_tool_rounds {
        let offer_tools = round < limits.max_tool_rounds;
        let mut request = CompletionRequest::new(persona.instructions.clone(), working.clone());
        if offer_tools {
            request = request.with_tools(tools.clone());
        }

        let completion = tokio::time::timeout(limits.model_timeout, brain.complete(request))
            .await
            .map_err(|_| OrchestratorError::Timeout("persona turn"))??;

        if let Some(text) = completion.non_empty_text() {
            push(&mut working, &mut items, TurnItem::assistant(text));
        }

        if !completion.has_tool_calls() {
            break;
        }
        if !offer_tools {
            warn!(
                persona = persona.name(),
                rounds = limits.max_tool_rounds,
                "Tool round limit reached, ending turn"
            );
            break;
        }

        for call in completion.tool_calls {
            debug!(persona = persona.name(), tool = %call.name, round, "Executing tool call");
            push(
                &mut working,
                &mut items,
                TurnItem::ToolCall {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            );

            let result = match ToolRequest::from_call(call.id.clone(), call.name.clone(), &call.arguments)
            {
                Ok(request) => executor.execute(request.with_metadata(meta.clone())).await,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call arguments are not valid JSON");
                    ToolResult::error(&call.id, format!("Arguments are not valid JSON: {}", e))
                }
            };

            push(
                &mut working,
                &mut items,
                TurnItem::ToolOutput {
                    call_id: call.id,
                    name: call.name,
                    success: result.success,
                    output: result.content,
                },
            );
        }
    }

    let tools_invoked: Vec<String> = items
        .iter()
        .filter_map(|item| item.tool_call_name().map(str::to_string))
        .collect();
    let text = fallback_text(&items);

    info!(
        persona = persona.name(),
        tools = tools_invoked.len(),
        reply_chars = text.len(),
        "Persona turn complete"
    );

    Ok(TurnOutput {
        items,
        text,
        tools_invoked,
    })
}

fn push(working: &mut Vec<TurnItem>, items: &mut Vec<TurnItem>, item: TurnItem) {
    working.push(item.clone());
    items.push(item);
}

/// Last non-empty assistant text among `items`, or an empty string.
pub fn fallback_text(items: &[TurnItem]) -> String {
    items
        .iter()
        .rev()
        .filter_map(TurnItem::assistant_text)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{PersonaKind, SpecialistRouter};
    use brain_core::{async_trait, ToolDefinition};
    use mock_brain::ScriptedBrain;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and answers every call successfully.
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<ToolRequest>>,
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, request: ToolRequest) -> ToolResult {
            let id = request.id.clone();
            self.seen.lock().unwrap().push(request);
            ToolResult::success(id, r#"{"success":true,"total_debt":150.0}"#)
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "get_debt".into(),
                description: "debt".into(),
                parameters: json!({ "type": "object" }),
            }]
        }
    }

    fn billing() -> Persona {
        SpecialistRouter::default()
            .persona(PersonaKind::Billing)
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_tool_loop_records_items() {
        let brain = ScriptedBrain::new()
            .then_tool_call("get_debt", json!({ "contract_number": "123456" }))
            .then_text("Your balance is 150.00");
        let executor = RecordingExecutor::default();
        let mut meta = ToolRequestMeta::default();
        meta.slots.insert("contract_number".into(), "123456".into());

        let output = run_persona_turn(
            &brain,
            &billing(),
            &executor,
            &[TurnItem::user("balance?")],
            &meta,
            TurnLimits::default(),
        )
        .await
        .unwrap();

        assert_eq!(output.text, "Your balance is 150.00");
        assert_eq!(output.tools_invoked, vec!["get_debt"]);
        assert_eq!(output.items.len(), 3);
        assert!(matches!(output.items[1], TurnItem::ToolOutput { success: true, .. }));

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0].metadata.as_ref().unwrap().slot("contract_number"), Some("123456"));

        // The second model call sees the tool output.
        let requests = brain.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].items.len(), 3);
        assert_eq!(requests[1].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_round_limit_falls_back_to_last_text() {
        let brain = ScriptedBrain::new()
            .then(brain_core::Completion {
                text: Some("Let me check.".into()),
                tool_calls: vec![brain_core::ToolCall::new("a", "get_debt", "{}")],
            })
            .then_tool_call("get_debt", json!({}))
            .then_tool_call("get_debt", json!({}));
        let executor = RecordingExecutor::default();

        let output = run_persona_turn(
            &brain,
            &billing(),
            &executor,
            &[TurnItem::user("balance?")],
            &ToolRequestMeta::default(),
            TurnLimits {
                max_tool_rounds: 2,
                ..TurnLimits::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(output.text, "Let me check.");
        assert_eq!(output.tools_invoked.len(), 2);
        // Final call is made without tools.
        assert!(brain.requests()[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_failed_output() {
        let brain = ScriptedBrain::new()
            .then(brain_core::Completion::tool_calls(vec![brain_core::ToolCall::new(
                "x", "get_debt", "{not json",
            )]))
            .then_text("Sorry, try again.");
        let executor = RecordingExecutor::default();

        let output = run_persona_turn(
            &brain,
            &billing(),
            &executor,
            &[TurnItem::user("balance?")],
            &ToolRequestMeta::default(),
            TurnLimits::default(),
        )
        .await
        .unwrap();

        assert!(executor.seen.lock().unwrap().is_empty());
        assert!(matches!(output.items[1], TurnItem::ToolOutput { success: false, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_model_times_out() {
        let brain = mock_brain::DelayedBrain::new(
            ScriptedBrain::new().then_text("too late"),
            Duration::from_secs(120),
        );

        let err = run_persona_turn(
            &brain,
            &billing(),
            &RecordingExecutor::default(),
            &[TurnItem::user("balance?")],
            &ToolRequestMeta::default(),
            TurnLimits {
                model_timeout: Duration::from_secs(5),
                ..TurnLimits::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrchestratorError::Timeout("persona turn")));
    }

    #[test]
    fn test_fallback_text_scans_backward() {
        let items = vec![
            TurnItem::assistant("first"),
            TurnItem::ToolCall {
                call_id: "1".into(),
                name: "get_debt".into(),
                arguments: "{}".into(),
            },
            TurnItem::assistant("   "),
        ];
        assert_eq!(fallback_text(&items), "first");
        assert_eq!(fallback_text(&[]), "");
    }
}
