//! Error types for model calls.

use thiserror::Error;

/// Errors that can occur while invoking a model.
#[derive(Debug, Error)]
pub enum BrainError {
    /// The model backend is temporarily unavailable.
    #[error("brain unavailable: {0}")]
    Unavailable(String),

    /// Network failure talking to the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The call could not be processed.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The backend answered with something that could not be used.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The call exceeded its deadline.
    #[error("processing timed out")]
    Timeout,
}
