//! Request and response types for a single model completion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::TurnItem;
use crate::tools::ToolDefinition;

/// Output shape requested from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// Free text, optionally with tool calls.
    Text,
    /// A JSON object conforming to the given schema.
    Json { name: String, schema: Value },
}

/// Everything the model needs for one call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instructions for this call.
    pub instructions: String,
    /// Working history, oldest first.
    pub items: Vec<TurnItem>,
    /// Tools the model may call. Empty means no tool calling.
    pub tools: Vec<ToolDefinition>,
    /// Requested output shape.
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    /// Create a free-text request without tools.
    pub fn new(instructions: impl Into<String>, items: Vec<TurnItem>) -> Self {
        Self {
            instructions: instructions.into(),
            items,
            tools: Vec::new(),
            response_format: ResponseFormat::Text,
        }
    }

    /// Make the given tools available to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Request structured JSON output.
    pub fn with_json_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.response_format = ResponseFormat::Json {
            name: name.into(),
            schema,
        };
        self
    }
}

/// A tool invocation emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back with the tool output.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Result of one model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Assistant text, if the model produced any.
    pub text: Option<String>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    /// A text-only completion.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A completion that only requests tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }

    /// Whether the model asked for any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Non-empty assistant text, if any.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
