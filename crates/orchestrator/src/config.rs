//! Orchestrator configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use brain_core::DEFAULT_MAX_CONVERSATIONS;
use tracing::warn;

use crate::runner::TurnLimits;

/// Runtime settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// History items kept per conversation.
    pub max_history_items: usize,
    /// Idle time after which a conversation is forgotten.
    pub conversation_ttl: Duration,
    /// How often expired conversations are swept.
    pub sweep_interval: Duration,
    /// Conversations tracked before LRU eviction.
    pub max_conversations: usize,
    /// Deadline for each model call.
    pub model_timeout: Duration,
    /// Tool-calling rounds per persona turn.
    pub max_tool_rounds: usize,
    /// Directory of `{persona}.md` instruction overrides.
    pub persona_prompt_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_history_items: 30,
            conversation_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(300),
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            model_timeout: Duration::from_secs(45),
            max_tool_rounds: 6,
            persona_prompt_dir: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables.
    ///
    /// - `MAX_HISTORY_ITEMS` (default 30)
    /// - `CONVERSATION_TTL_SECS` (default 1800)
    /// - `CONVERSATION_SWEEP_SECS` (default 300)
    /// - `MAX_CONVERSATIONS` (default 10000)
    /// - `MODEL_TIMEOUT_SECS` (default 45)
    /// - `MAX_TOOL_ROUNDS` (default 6)
    /// - `PERSONA_PROMPT_DIR` (optional)
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_history_items: env_parse("MAX_HISTORY_ITEMS", defaults.max_history_items),
            conversation_ttl: Duration::from_secs(env_parse(
                "CONVERSATION_TTL_SECS",
                defaults.conversation_ttl.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "CONVERSATION_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            max_conversations: env_parse("MAX_CONVERSATIONS", defaults.max_conversations),
            model_timeout: Duration::from_secs(env_parse(
                "MODEL_TIMEOUT_SECS",
                defaults.model_timeout.as_secs(),
            )),
            max_tool_rounds: env_parse("MAX_TOOL_ROUNDS", defaults.max_tool_rounds),
            persona_prompt_dir: env::var("PERSONA_PROMPT_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn turn_limits(&self) -> TurnLimits {
        TurnLimits {
            max_tool_rounds: self.max_tool_rounds,
            model_timeout: self.model_timeout,
        }
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
