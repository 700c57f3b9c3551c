//! OpenAiBrain implementation over the chat completions API.

use std::collections::HashSet;

use brain_core::{
    async_trait, Brain, BrainError, Completion, CompletionRequest, ResponseFormat, Role, ToolCall,
    TurnItem,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::api_types::{
    ApiError, ApiResponseFormat, ApiTool, ApiToolCall, ChatCompletionRequest,
    ChatCompletionResponse, ChatMessage, FunctionCall, FunctionSpec, JsonSchemaSpec,
};
use crate::config::OpenAiBrainConfig;

/// A brain that calls an OpenAI-compatible chat completions endpoint.
///
/// The brain is stateless: every call carries the full working history.
/// Tool calls are returned to the caller, never executed here.
pub struct OpenAiBrain {
    client: Client,
    config: OpenAiBrainConfig,
}

impl OpenAiBrain {
    /// Create a new OpenAiBrain with the given configuration.
    pub fn new(config: OpenAiBrainConfig) -> Result<Self, BrainError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BrainError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        info!("OpenAiBrain initialized with model: {}", config.model);

        Ok(Self { client, config })
    }

    /// Create an OpenAiBrain from environment variables.
    ///
    /// See [`OpenAiBrainConfig::from_env`] for required environment variables.
    pub fn from_env() -> Result<Self, BrainError> {
        Self::new(OpenAiBrainConfig::from_env()?)
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenAiBrainConfig {
        &self.config
    }

    /// Make a chat completion request.
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, BrainError> {
        let url = format!("{}/v1/chat/completions", self.config.api_url.trim_end_matches('/'));

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrainError::Timeout
                } else {
                    BrainError::Network(format!("Failed to send request: {}", e))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|api_error| api_error.error.message)
                .unwrap_or(error_text);
            let message = format!("API error ({}): {}", status.as_u16(), message);

            return Err(if status.as_u16() == 429 || status.is_server_error() {
                BrainError::Unavailable(message)
            } else {
                BrainError::ProcessingFailed(message)
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BrainError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage - prompt: {}, completion: {}, total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        Ok(completion)
    }

    fn build_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let tools = request
            .tools
            .iter()
            .map(|def| ApiTool {
                tool_type: "function".to_string(),
                function: FunctionSpec {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: def.parameters.clone(),
                },
            })
            .collect();

        let response_format = match &request.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::Json { name, schema } => Some(ApiResponseFormat::JsonSchema {
                json_schema: JsonSchemaSpec {
                    name: name.clone(),
                    schema: schema.clone(),
                },
            }),
        };

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: build_messages(&request.instructions, &request.items),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools,
            response_format,
        }
    }
}

/// Convert the working history into chat messages.
///
/// Consecutive tool calls are grouped into one assistant message. A call
/// whose output was cut off by history bounding (or an output whose call
/// was) is dropped, since the API rejects unpaired tool messages.
fn build_messages(instructions: &str, items: &[TurnItem]) -> Vec<ChatMessage> {
    let mut calls = HashSet::new();
    let mut outputs = HashSet::new();
    for item in items {
        match item {
            TurnItem::ToolCall { call_id, .. } => {
                calls.insert(call_id.as_str());
            }
            TurnItem::ToolOutput { call_id, .. } => {
                outputs.insert(call_id.as_str());
            }
            TurnItem::Message { .. } => {}
        }
    }

    let mut messages = Vec::with_capacity(items.len() + 1);
    if !instructions.trim().is_empty() {
        messages.push(ChatMessage::system(instructions));
    }

    for item in items {
        match item {
            TurnItem::Message {
                role,
                content,
                image_url,
            } => messages.push(match role {
                Role::System => ChatMessage::system(content.clone()),
                Role::User => ChatMessage::user(content.clone(), image_url.as_deref()),
                Role::Assistant => ChatMessage::assistant(content.clone()),
            }),
            TurnItem::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                if !outputs.contains(call_id.as_str()) {
                    debug!(call_id = %call_id, "Dropping tool call without output");
                    continue;
                }
                let call = ApiToolCall {
                    id: call_id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    },
                };
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" && !last.tool_calls.is_empty() => {
                        last.tool_calls.push(call)
                    }
                    _ => messages.push(ChatMessage::assistant_tool_calls(vec![call])),
                }
            }
            TurnItem::ToolOutput {
                call_id, output, ..
            } => {
                if !calls.contains(call_id.as_str()) {
                    debug!(call_id = %call_id, "Dropping tool output without call");
                    continue;
                }
                messages.push(ChatMessage::tool(call_id.clone(), output.clone()));
            }
        }
    }

    messages
}

#[async_trait]
impl Brain for OpenAiBrain {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BrainError> {
        let api_request = self.build_request(&request);
        let response = self.chat_completion(&api_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BrainError::InvalidResponse("No choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("Completion truncated by max_tokens");
        }

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok(Completion {
            text: choice.message.content,
            tool_calls,
        })
    }

    fn name(&self) -> &str {
        "OpenAiBrain"
    }
}
