//! Error types for tool operations.

use std::time::Duration;

use database::DatabaseError;
use thiserror::Error;
use upstream_api::UpstreamError;

use crate::tool::{FailureKind, ToolOutput};

/// Errors that can occur inside a tool.
///
/// These never leave the registry: [`ToolError::into_output`] turns each one
/// into a [`ToolOutput::Failure`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Missing required parameter.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Invalid parameter value.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Arguments do not match the tool's schema.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// Upstream transport failure.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Persistent store failure.
    #[error("Store error: {0}")]
    Database(#[from] DatabaseError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// One attempt exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// General execution error.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    /// Whether a read tool should try again.
    pub fn is_transient(&self) -> bool {
        match self {
            ToolError::Upstream(e) => e.is_transient(),
            ToolError::Database(e) => e.is_transient(),
            ToolError::HttpError(e) => e.is_timeout() || e.is_connect(),
            ToolError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Failure category reported to the model.
    pub fn kind(&self) -> FailureKind {
        match self {
            ToolError::NotFound(_) => FailureKind::NotFound,
            ToolError::MissingParameter(_)
            | ToolError::InvalidParameter { .. }
            | ToolError::Validation(_) => FailureKind::InvalidInput,
            ToolError::Upstream(_) | ToolError::HttpError(_) => FailureKind::Upstream,
            ToolError::Database(DatabaseError::NotFound { .. }) => FailureKind::NotFound,
            ToolError::Database(DatabaseError::InvalidState { .. }) => FailureKind::Rejected,
            ToolError::Database(_) => FailureKind::Unavailable,
            ToolError::Timeout(_) => FailureKind::Timeout,
            ToolError::JsonError(_) | ToolError::ExecutionFailed(_) => FailureKind::Internal,
        }
    }

    /// Convert into a failure output.
    pub fn into_output(self) -> ToolOutput {
        let message = match &self {
            ToolError::Database(DatabaseError::NotFound { entity, id }) => {
                format!("{} {} was not found", entity, id)
            }
            ToolError::Database(DatabaseError::InvalidState { reason, .. }) => reason.clone(),
            other => other.to_string(),
        };
        ToolOutput::failure(self.kind(), message)
    }
}
