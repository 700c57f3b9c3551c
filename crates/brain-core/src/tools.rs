//! Tool execution contracts.
//!
//! A persona turn may ask the model to call tools (query a balance, open a
//! ticket, report an incident). The model only emits the call; the
//! orchestrator hands it to a [`ToolExecutor`], which owns validation,
//! retries and the external side effect.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Context about the conversation a tool call belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRequestMeta {
    /// Conversation identifier.
    pub conversation_id: Option<String>,
    /// Channel the conversation is happening on.
    pub channel: Option<String>,
    /// Sticky slots known for the conversation (e.g., contract_number).
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
}

impl ToolRequestMeta {
    /// Look up a sticky slot value.
    pub fn slot(&self, key: &str) -> Option<&str> {
        self.slots.get(key).map(|s| s.as_str())
    }
}

/// Declaration of a tool as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The tool call ID this result corresponds to.
    pub tool_call_id: String,
    /// The result content, a JSON document sent back to the model.
    pub content: String,
    /// Whether the tool execution succeeded.
    pub success: bool,
}

impl ToolResult {
    /// Create a successful tool result.
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            success: true,
        }
    }

    /// Create a failed tool result.
    ///
    /// The content is a `{"success": false, "error": ...}` document so the
    /// model sees failures in the same shape the tools report them.
    pub fn error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        let content = serde_json::json!({ "success": false, "error": error.into() });
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.to_string(),
            success: false,
        }
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// Unique ID for this tool call.
    pub id: String,
    /// Name of the tool to execute.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: HashMap<String, Value>,
    /// Optional metadata about the tool call.
    pub metadata: Option<ToolRequestMeta>,
}

impl ToolRequest {
    /// Parse arguments from a JSON string.
    ///
    /// An empty string is treated as an empty arguments object, which is
    /// what some models emit for tools without parameters.
    pub fn from_call(
        id: String,
        name: String,
        arguments_json: &str,
    ) -> Result<Self, serde_json::Error> {
        let arguments: HashMap<String, Value> = if arguments_json.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(arguments_json)?
        };
        Ok(Self {
            id,
            name,
            arguments,
            metadata: None,
        })
    }

    /// Build a request from already-parsed arguments.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            metadata: None,
        }
    }

    /// Attach metadata to an existing tool request.
    pub fn with_metadata(mut self, metadata: ToolRequestMeta) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Get a string argument by name.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Trait for executing tools called by a model.
///
/// Implementations must never fail: every error becomes a [`ToolResult`]
/// with `success == false`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool and return the result.
    async fn execute(&self, request: ToolRequest) -> ToolResult;

    /// Definitions of the tools this executor exposes.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// List the tools this executor supports.
    fn supported_tools(&self) -> Vec<String> {
        self.definitions().into_iter().map(|d| d.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("call-123", r#"{"success":true}"#);
        assert!(result.success);
        assert_eq!(result.tool_call_id, "call-123");
    }

    #[test]
    fn test_tool_result_error_is_tagged_json() {
        let result = ToolResult::error("call-456", "Something went wrong");
        assert!(!result.success);
        let value: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Something went wrong");
    }

    #[test]
    fn test_tool_request_parsing() {
        let request = ToolRequest::from_call(
            "id-1".to_string(),
            "get_debt".to_string(),
            r#"{"contract_number": "123456"}"#,
        )
        .unwrap();

        assert_eq!(request.name, "get_debt");
        assert_eq!(request.get_string("contract_number"), Some("123456"));
        assert!(request.metadata.is_none());
    }

    #[test]
    fn test_empty_arguments_string() {
        let request =
            ToolRequest::from_call("id-1".to_string(), "get_service_alerts".to_string(), "")
                .unwrap();
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn test_meta_slot_lookup() {
        let mut meta = ToolRequestMeta::default();
        meta.slots.insert("contract_number".into(), "123456".into());
        assert_eq!(meta.slot("contract_number"), Some("123456"));
        assert_eq!(meta.slot("locality"), None);
    }
}
