//! Configuration for OpenAiBrain.

use std::env;
use std::time::Duration;

use brain_core::BrainError;
use secrecy::SecretString;

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.openai.com";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for OpenAiBrain.
#[derive(Debug, Clone)]
pub struct OpenAiBrainConfig {
    /// Base URL of the chat completions API (without `/v1/...`).
    pub api_url: String,

    /// API key for authentication.
    pub api_key: SecretString,

    /// Model name to use.
    pub model: String,

    /// Maximum tokens for response.
    pub max_tokens: Option<u32>,

    /// Temperature for generation (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for OpenAiBrainConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: SecretString::from(String::new()),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(1024),
            temperature: Some(0.3),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiBrainConfig {
    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `OPENAI_API_KEY` - API key for authentication
    ///
    /// Optional environment variables:
    /// - `OPENAI_API_URL` - API URL (default: https://api.openai.com)
    /// - `OPENAI_MODEL` - Model name (default: gpt-4o-mini)
    /// - `OPENAI_MAX_TOKENS` - Max tokens (default: 1024)
    /// - `OPENAI_TEMPERATURE` - Temperature (default: 0.3)
    /// - `OPENAI_TIMEOUT_SECS` - Request timeout (default: 60)
    pub fn from_env() -> Result<Self, BrainError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| BrainError::Configuration("OPENAI_API_KEY not set".to_string()))?;

        let api_url = env::var("OPENAI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let max_tokens = env::var("OPENAI_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(1024));

        let temperature = env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(Some(0.3));

        let request_timeout = env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            api_url,
            api_key: SecretString::from(api_key),
            model,
            max_tokens,
            temperature,
            request_timeout,
        })
    }

    /// Configuration for the classifier model.
    ///
    /// Same as [`from_env`](Self::from_env), except that `OPENAI_CLASSIFIER_MODEL`
    /// (when set) replaces the model and the temperature is pinned to 0.
    pub fn classifier_from_env() -> Result<Self, BrainError> {
        let mut config = Self::from_env()?;
        if let Ok(model) = env::var("OPENAI_CLASSIFIER_MODEL") {
            config.model = model;
        }
        config.temperature = Some(0.0);
        Ok(config)
    }

    /// Create a new config builder.
    pub fn builder() -> OpenAiBrainConfigBuilder {
        OpenAiBrainConfigBuilder::default()
    }
}

/// Builder for OpenAiBrainConfig.
#[derive(Debug, Default)]
pub struct OpenAiBrainConfigBuilder {
    config: OpenAiBrainConfig,
}

impl OpenAiBrainConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = SecretString::from(key.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> OpenAiBrainConfig {
        self.config
    }
}
