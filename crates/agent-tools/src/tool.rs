//! Tool trait definition and types.

use std::collections::HashMap;

use async_trait::async_trait;
use brain_core::{ToolDefinition, ToolRequestMeta};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Sticky slot holding the contract number.
pub const CONTRACT_SLOT: &str = "contract_number";

/// Sticky slot holding the locality.
pub const LOCALITY_SLOT: &str = "locality";

/// Arguments passed to a tool for execution.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    /// Parameters as key-value pairs.
    pub params: HashMap<String, Value>,
    /// Conversation context (id, channel, sticky slots).
    pub meta: ToolRequestMeta,
}

impl ToolArgs {
    /// Create new tool arguments with the given parameters.
    pub fn new(params: HashMap<String, Value>) -> Self {
        Self {
            params,
            meta: ToolRequestMeta::default(),
        }
    }

    /// Attach conversation context.
    pub fn with_meta(mut self, meta: ToolRequestMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Get a non-empty string parameter, returning an error if missing.
    pub fn get_string(&self, key: &str) -> Result<String, ToolError> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))?
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameter {
                name: key.to_string(),
                reason: "expected string".to_string(),
            })?
            .trim();

        if value.is_empty() {
            return Err(ToolError::MissingParameter(key.to_string()));
        }
        Ok(value.to_string())
    }

    /// Get an optional string parameter. Blank strings count as absent.
    pub fn get_string_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Get a string parameter, falling back to a sticky slot.
    pub fn get_string_or_slot(&self, key: &str, slot: &str) -> Option<String> {
        self.get_string_opt(key).or_else(|| {
            self.meta
                .slot(slot)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }

    /// The contract number from the arguments or the conversation's sticky slot.
    pub fn contract_number(&self) -> Result<String, ToolError> {
        self.get_string_or_slot("contract_number", CONTRACT_SLOT)
            .ok_or_else(|| ToolError::MissingParameter("contract_number".to_string()))
    }

    /// Get an optional boolean parameter with a default value.
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Get an f64 parameter, returning an error if missing or not a number.
    pub fn get_f64(&self, key: &str) -> Result<f64, ToolError> {
        self.params
            .get(key)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))?
            .as_f64()
            .ok_or_else(|| ToolError::InvalidParameter {
                name: key.to_string(),
                reason: "expected number".to_string(),
            })
    }

    /// Get an optional f64 parameter.
    pub fn get_number_opt(&self, key: &str) -> Result<Option<f64>, ToolError> {
        match self.params.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(v) => {
                let num = v.as_f64().ok_or_else(|| ToolError::InvalidParameter {
                    name: key.to_string(),
                    reason: "expected number".to_string(),
                })?;
                Ok(Some(num))
            }
        }
    }

    /// Get an optional unsigned integer parameter with a default value.
    pub fn get_u64_or(&self, key: &str, default: u64) -> u64 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }
}

/// Why a tool call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Arguments were missing or malformed.
    InvalidInput,
    /// The requested record does not exist.
    NotFound,
    /// The upstream service failed or reported an error.
    Upstream,
    /// A backing store could not be reached.
    Unavailable,
    /// The call ran out of time.
    Timeout,
    /// The change is not allowed in the record's current state.
    Rejected,
    /// Anything else.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::NotFound => "not_found",
            FailureKind::Upstream => "upstream",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::Rejected => "rejected",
            FailureKind::Internal => "internal",
        }
    }
}

/// Output from a tool execution.
///
/// Serialized for the model as `{"success": true, ...fields}` or
/// `{"success": false, "error": "...", "error_kind": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Success { data: Map<String, Value> },
    Failure { kind: FailureKind, message: String },
}

impl ToolOutput {
    /// Create a successful output from a JSON object.
    ///
    /// Non-object values are wrapped under a `result` key.
    pub fn success(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        ToolOutput::Success { data }
    }

    /// Create a failed output.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ToolOutput::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutput::Success { .. })
    }

    /// A field of the success payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ToolOutput::Success { data } => data.get(key),
            ToolOutput::Failure { .. } => None,
        }
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            ToolOutput::Success { .. } => None,
            ToolOutput::Failure { message, .. } => Some(message.as_str()),
        }
    }

    /// The JSON document shown to the model.
    pub fn to_json(&self) -> Value {
        match self {
            ToolOutput::Success { data } => {
                let mut map = Map::with_capacity(data.len() + 1);
                map.insert("success".to_string(), Value::Bool(true));
                for (key, value) in data {
                    if key != "success" {
                        map.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(map)
            }
            ToolOutput::Failure { kind, message } => json!({
                "success": false,
                "error": message,
                "error_kind": kind.as_str(),
            }),
        }
    }
}

/// Whether a tool only reads or also mutates external state.
///
/// Read tools are retried on transient failures; write tools run at most
/// once per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Write,
}

/// Trait for tools a persona may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's unique name (used for dispatch).
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: ToolArgs) -> Result<ToolOutput, ToolError>;

    /// Declaration presented to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}
