//! Chat completions request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message content: plain text, or parts when an image is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", "assistant" or "tool"
    pub role: String,
    /// Message content (absent on assistant messages that only call tools)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ApiToolCall>,
    /// Call answered by a tool message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: Option<ChatContent>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", Some(ChatContent::Text(content.into())))
    }

    /// Create a user message, with an optional image.
    pub fn user(content: impl Into<String>, image_url: Option<&str>) -> Self {
        let content = content.into();
        let content = match image_url {
            Some(url) => ChatContent::Parts(vec![
                ContentPart::Text { text: content },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.to_string(),
                    },
                },
            ]),
            None => ChatContent::Text(content),
        };
        Self::with_role("user", Some(content))
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", Some(ChatContent::Text(content.into())))
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_tool_calls(calls: Vec<ApiToolCall>) -> Self {
        let mut msg = Self::with_role("assistant", None);
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool output message.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role("tool", Some(ChatContent::Text(content.into())));
        msg.tool_call_id = Some(call_id.into());
        msg
    }
}

/// A function tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string
    #[serde(default)]
    pub arguments: String,
}

/// A function tool offered to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Structured output request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiResponseFormat {
    JsonSchema { json_schema: JsonSchemaSpec },
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub schema: Value,
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Tools the model may call
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ApiResponseFormat>,
}

/// Chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response choices
    pub choices: Vec<Choice>,
    /// Token usage
    pub usage: Option<Usage>,
}

/// A response choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The message
    pub message: ResponseMessage,
    /// Finish reason
    pub finish_reason: Option<String>,
}

/// Assistant message returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    /// Content (null when the model only calls tools)
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ApiToolCall>,
}

/// Token usage information.
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetails,
}

/// API error details.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_message_with_image_uses_parts() {
        let msg = ChatMessage::user("look", Some("https://img.example/1.jpg"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["content"][0], json!({ "type": "text", "text": "look" }));
        assert_eq!(
            value["content"][1]["image_url"]["url"],
            "https://img.example/1.jpg"
        );
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_tool_message_shape() {
        let value = serde_json::to_value(ChatMessage::tool("call_1", "{}")).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
    }

    #[test]
    fn test_response_with_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "get_debt", "arguments": "{\"contract_number\":\"1\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let message = &response.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].function.name, "get_debt");
    }
}
