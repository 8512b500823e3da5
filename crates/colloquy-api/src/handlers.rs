//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters and bodies via axum extractors,
//! calls into the [`ContextManager`](colloquy_context::ContextManager) and
//! returns JSON.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use colloquy_context::{
    ContextEntry, ContextError, ContextStats, ContextualResponse, Parameters, SessionState,
};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

/// Request body for POST /conversations/{id}/commands.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// The user's utterance, already transcribed.
    pub text: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_contexts: usize,
}

/// Reply to one turn. A tool failure still yields the recovery reply; the
/// failure reason rides along in `error`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(flatten)]
    pub response: ContextualResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub entries: Vec<ContextEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateResponse {
    pub conversation_id: String,
    pub session_state: SessionState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParametersResponse {
    pub conversation_id: String,
    pub pending_parameters: Parameters,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub imported: bool,
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_contexts: state.manager.stats().active_contexts,
    })
}

// =============================================================================
// Conversations
// =============================================================================

/// POST /conversations/{id}/commands - process one user turn.
pub async fn process_command(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    match state
        .manager
        .process_command(&request.text, &conversation_id)
        .await
    {
        Ok(response) => Ok(Json(CommandResponse {
            response,
            error: None,
        })),
        Err(ContextError::ToolExecutionFailed {
            tool,
            message,
            response,
        }) => {
            tracing::warn!(
                conversation_id = %conversation_id,
                tool = %tool,
                error = %message,
                "Returning recovery reply after tool failure"
            );
            Ok(Json(CommandResponse {
                response: *response,
                error: Some(format!("{} failed", tool)),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /conversations/{id}/history - full turn history.
pub async fn get_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.manager.get_history(&conversation_id)?;
    Ok(Json(HistoryResponse {
        conversation_id,
        entries,
    }))
}

/// GET /conversations/{id}/state - current session state.
pub async fn get_state(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    let session_state = state.manager.get_session_state(&conversation_id)?;
    Ok(Json(StateResponse {
        conversation_id,
        session_state,
    }))
}

/// GET /conversations/{id}/parameters - parameters collected so far.
pub async fn get_parameters(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ParametersResponse>, ApiError> {
    let pending_parameters = state.manager.get_pending_parameters(&conversation_id)?;
    Ok(Json(ParametersResponse {
        conversation_id,
        pending_parameters,
    }))
}

/// DELETE /conversations/{id} - drop a conversation.
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.manager.clear_context(&conversation_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Conversation {} not found",
            conversation_id
        )))
    }
}

/// GET /conversations/{id}/export - serialized context.
pub async fn export_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<([(axum::http::HeaderName, &'static str); 1], String), ApiError> {
    let json = state.manager.export_context(&conversation_id)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "application/json")], json))
}

/// POST /conversations/import - restore an exported context.
///
/// The body is taken verbatim; malformed input yields `imported: false`.
pub async fn import_conversation(State(state): State<AppState>, body: String) -> Json<ImportResponse> {
    Json(ImportResponse {
        imported: state.manager.import_context(&body),
    })
}

/// GET /stats - aggregate counters over live conversations.
pub async fn stats(State(state): State<AppState>) -> Json<ContextStats> {
    Json(state.manager.stats())
}
