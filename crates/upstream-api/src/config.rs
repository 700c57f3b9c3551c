//! Configuration for the upstream client.

use secrecy::SecretString;
use std::env;
use std::time::Duration;

use crate::error::UpstreamError;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`UpstreamClient`](crate::UpstreamClient).
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the SOAP services (e.g., "https://aquacis.example.gob.mx/services").
    pub api_url: String,
    /// Optional username for HTTP basic authentication.
    pub username: Option<String>,
    /// Optional password or token for HTTP basic authentication.
    pub token: Option<SecretString>,
    /// Timeout applied to each request.
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// Create a configuration for the given base URL with default settings.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            username: None,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Required:
    /// - `UPSTREAM_API_URL` - Base URL of the SOAP services
    ///
    /// Optional:
    /// - `UPSTREAM_API_USER` / `UPSTREAM_API_TOKEN` - Basic-auth credentials
    /// - `UPSTREAM_TIMEOUT_SECS` - Per-request timeout (default: 30)
    pub fn from_env() -> Result<Self, UpstreamError> {
        let api_url = env::var("UPSTREAM_API_URL")
            .map_err(|_| UpstreamError::Configuration("UPSTREAM_API_URL not set".to_string()))?;

        let mut config = Self::new(api_url);

        if let (Ok(user), Ok(token)) = (env::var("UPSTREAM_API_USER"), env::var("UPSTREAM_API_TOKEN")) {
            config = config.with_credentials(user, token);
        }

        if let Ok(raw) = env::var("UPSTREAM_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| {
                UpstreamError::Configuration(format!("Invalid UPSTREAM_TIMEOUT_SECS: {}", e))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
