//! Error types for upstream requests.

use thiserror::Error;

/// Errors raised while talking to an upstream service.
///
/// These describe transport-level failures only. A well-formed response
/// that reports a business error is not an `UpstreamError`; it is parsed
/// into an [`UpstreamResult::Failure`](crate::UpstreamResult::Failure).
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request did not complete within the configured timeout.
    #[error("upstream request timed out")]
    Timeout,

    /// Connection or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl UpstreamError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::Network(_) => true,
            UpstreamError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            UpstreamError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::Network("reset".into()).is_transient());
        assert!(UpstreamError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!UpstreamError::Status {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!UpstreamError::Configuration("x".into()).is_transient());
    }
}
