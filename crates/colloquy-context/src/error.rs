//! Error types for the conversation context engine.

use colloquy_core::error::ColloquyError;

use crate::types::{ContextualResponse, SessionState};

/// Errors from the context engine.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Parameter extraction failed: {0}")]
    ParameterExtractionFailed(String),
    /// The tool executor failed. Carries the recovery response already
    /// produced for the user so callers can both log and reply.
    #[error("Tool execution failed for {tool}: {message}")]
    ToolExecutionFailed {
        tool: String,
        message: String,
        response: Box<ContextualResponse>,
    },
    #[error("Message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ContextError {
    /// The user-facing response attached to a tool failure, if any.
    pub fn recovery_response(&self) -> Option<&ContextualResponse> {
        match self {
            ContextError::ToolExecutionFailed { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::Serialization(err.to_string())
    }
}

impl From<ContextError> for ColloquyError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Serialization(msg) => ColloquyError::Serialization(msg),
            other => ColloquyError::Context(other.to_string()),
        }
    }
}

/// Errors raised by external collaborators (tool executor, history provider).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not available: {0}")]
    Unavailable(String),
    #[error("Tool rejected arguments: {0}")]
    InvalidArguments(String),
    #[error("Tool failed: {0}")]
    Failed(String),
    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),
    /// The turn awaiting the tool went away before it finished.
    #[error("Tool call was interrupted")]
    Interrupted,
}
