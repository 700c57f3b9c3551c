//! Intent classification.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use brain_core::{hash_prompt, Brain, CompletionRequest, Role, Slots, TurnItem};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use crate::error::OrchestratorError;
use crate::intent::Intent;

/// Default path for the classifier prompt file.
pub const DEFAULT_CLASSIFIER_PROMPT_FILE: &str = "CLASSIFIER_PROMPT.md";

/// Recent history messages shown to the classifier as context.
const CONTEXT_MESSAGES: usize = 6;

/// Each context line is cut to this many characters.
const CONTEXT_LINE_CHARS: usize = 200;

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    /// Slots extracted from this message (best effort, may be empty).
    pub slots: Slots,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    #[serde(default)]
    contract_number: Option<Value>,
    #[serde(default)]
    locality: Option<Value>,
}

/// Build the embedded default prompt from the intent descriptions.
pub fn default_classifier_prompt() -> String {
    let mut prompt = String::from(
        "You classify messages sent by citizens to the water utility's customer service line.\n\
         Pick exactly one category for the new message. Use the context only to resolve \
         short follow-ups (\"and for last month?\").\n\nCategories:\n",
    );
    for intent in Intent::ALL {
        prompt.push_str(&format!("- {}: {}\n", intent.label(), intent.description()));
    }
    prompt.push_str(
        "\nAlso extract, when present in the new message:\n\
         - contract_number: the service contract number, digits only\n\
         - locality: the town or neighborhood mentioned\n\
         Use null for anything not present.\n\n\
         The input format is:\n\
         [CONTEXT: recent conversation, if any]\n\
         [MESSAGE: the citizen's new message]\n\n\
         Respond with JSON only: {\"category\": ..., \"contract_number\": ..., \"locality\": ...}",
    );
    prompt
}

/// Load the classifier system prompt.
///
/// Priority:
/// 1. `CLASSIFIER_SYSTEM_PROMPT` env var (if set)
/// 2. Contents of prompt file (`CLASSIFIER_PROMPT_FILE` or default `CLASSIFIER_PROMPT.md`)
/// 3. Embedded default prompt
pub fn load_classifier_prompt() -> String {
    if let Ok(prompt) = env::var("CLASSIFIER_SYSTEM_PROMPT") {
        info!("Using classifier prompt from CLASSIFIER_SYSTEM_PROMPT env var");
        return prompt;
    }

    let prompt_file = env::var("CLASSIFIER_PROMPT_FILE")
        .unwrap_or_else(|_| DEFAULT_CLASSIFIER_PROMPT_FILE.to_string());

    if let Some(prompt) = load_prompt_file(&prompt_file) {
        info!("Loaded classifier prompt from {}", prompt_file);
        return prompt;
    }

    info!("Using embedded default classifier prompt");
    default_classifier_prompt()
}

/// Load a prompt from a file path.
///
/// Returns `Some(content)` if the file exists and is non-empty.
pub(crate) fn load_prompt_file(path: impl AsRef<Path>) -> Option<String> {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

/// Output schema requested from the model.
pub fn classification_schema() -> Value {
    let labels: Vec<&str> = Intent::ALL.iter().map(|i| i.label()).collect();
    json!({
        "type": "object",
        "properties": {
            "category": { "type": "string", "enum": labels },
            "contract_number": { "type": ["string", "null"] },
            "locality": { "type": ["string", "null"] }
        },
        "required": ["category", "contract_number", "locality"],
        "additionalProperties": false
    })
}

/// Assigns exactly one [`Intent`] to each message.
///
/// The classifier is stateless; the caller passes the working history.
pub struct Classifier {
    brain: Arc<dyn Brain>,
    prompt: String,
    prompt_hash: String,
    timeout: Duration,
}

impl Classifier {
    /// Create a classifier with the prompt from [`load_classifier_prompt`].
    pub fn new(brain: Arc<dyn Brain>) -> Self {
        Self::with_prompt(brain, load_classifier_prompt())
    }

    pub fn with_prompt(brain: Arc<dyn Brain>, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let prompt_hash = hash_prompt(&prompt);
        info!("Classifier prompt fingerprint: {}", prompt_hash);
        Self {
            brain,
            prompt,
            prompt_hash,
            timeout: Duration::from_secs(45),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prompt_hash(&self) -> &str {
        &self.prompt_hash
    }

    /// Classify `text` given the conversation so far.
    ///
    /// Fails when the model errors, times out, or returns nothing that
    /// names a known intent. The caller must not guess an intent then.
    pub async fn classify(
        &self,
        history: &[TurnItem],
        text: &str,
    ) -> Result<Classification, OrchestratorError> {
        let input = format_classifier_input(history, text);
        trace!(formatted_input = %input, "CLASSIFIER_INPUT");

        let request = CompletionRequest::new(self.prompt.clone(), vec![TurnItem::user(input)])
            .with_json_schema("classification", classification_schema());

        let completion = tokio::time::timeout(self.timeout, self.brain.complete(request))
            .await
            .map_err(|_| OrchestratorError::Timeout("classification"))??;

        let raw = completion.non_empty_text().ok_or_else(|| {
            OrchestratorError::ClassificationFailed("model returned no output".to_string())
        })?;
        debug!("Classifier response: {}", raw);

        parse_classification(raw).inspect_err(|e| {
            warn!(error = %e, raw_response = %raw, "CLASSIFIER_PARSE_FAILED");
        })
    }
}

/// Format the classifier input: recent context lines plus the new message.
pub fn format_classifier_input(history: &[TurnItem], message: &str) -> String {
    let context: Vec<String> = history
        .iter()
        .filter(|item| {
            matches!(
                item,
                TurnItem::Message {
                    role: Role::User | Role::Assistant,
                    ..
                }
            )
        })
        .rev()
        .take(CONTEXT_MESSAGES)
        .map(|item| truncate_chars(&item.render(), CONTEXT_LINE_CHARS))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut parts = Vec::new();
    if !context.is_empty() {
        parts.push(format!("[CONTEXT: {}]", context.join(" | ")));
    }
    parts.push(format!("[MESSAGE: {}]", message));
    parts.join("\n")
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Parse the model output into a [`Classification`].
pub fn parse_classification(response: &str) -> Result<Classification, OrchestratorError> {
    let json_str = extract_json(response);
    let raw: RawClassification = serde_json::from_str(json_str).map_err(|e| {
        OrchestratorError::ClassificationFailed(format!("parse error: {}", e))
    })?;

    let intent = Intent::parse(&raw.category).ok_or_else(|| {
        OrchestratorError::ClassificationFailed(format!("unknown category: {}", raw.category))
    })?;

    Ok(Classification {
        intent,
        slots: Slots {
            contract_number: raw.contract_number.as_ref().and_then(contract_slot),
            locality: raw.locality.as_ref().and_then(text_slot),
        },
    })
}

fn text_slot(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Contract numbers may come back as numbers or with separators.
fn contract_slot(value: &Value) -> Option<String> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        other => text_slot(other)?,
    };
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Extract JSON from a response that may contain markdown or other text.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with('{') {
        return extract_balanced_json(trimmed);
    }

    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return extract_balanced_json(trimmed[json_start..json_start + end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_backticks = &trimmed[start + 3..];
        // Skip optional language identifier
        let json_start = after_backticks.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_backticks[json_start..].find("```") {
            return extract_balanced_json(after_backticks[json_start..json_start + end].trim());
        }
    }

    if let Some(start) = trimmed.find('{') {
        return extract_balanced_json(&trimmed[start..]);
    }

    trimmed
}

/// Extract a balanced JSON object from a string that starts with '{'.
///
/// Models sometimes append stray braces or prose after the object.
fn extract_balanced_json(s: &str) -> &str {
    if !s.starts_with('{') {
        return s;
    }

    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return &s[..=i];
                }
            }
            _ => {}
        }
    }

    s
}
