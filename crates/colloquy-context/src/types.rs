//! Core types and value objects for the conversation context engine.
//!
//! Defines conversation contexts, history entries, pending operations and
//! the tagged parameter value used everywhere a user-supplied value flows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parameter map keyed by parameter name.
pub type Parameters = BTreeMap<String, ParamValue>;

// =============================================================================
// ParamValue
// =============================================================================

/// A user-supplied parameter value.
///
/// Serialized as a plain JSON value so exported contexts stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Borrow the inner string of a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the items of a `List` value.
    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::List(values.into_iter().map(ParamValue::Text).collect())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            ParamValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Session states of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    CollectingParameters,
    Executing,
    AwaitingConfirmation,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::CollectingParameters => write!(f, "collecting_parameters"),
            SessionState::Executing => write!(f, "executing"),
            SessionState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionState::Idle),
            "collecting_parameters" => Ok(SessionState::CollectingParameters),
            "executing" => Ok(SessionState::Executing),
            "awaiting_confirmation" => Ok(SessionState::AwaitingConfirmation),
            "error" => Ok(SessionState::Error),
            _ => Err(format!("Unknown session state: {}", s)),
        }
    }
}

/// Intent categories the analyzer can classify an utterance into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    DocumentGeneration,
    EmailComposition,
    CalendarScheduling,
    WebSearch,
    Unknown,
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentCategory::DocumentGeneration => write!(f, "document_generation"),
            IntentCategory::EmailComposition => write!(f, "email_composition"),
            IntentCategory::CalendarScheduling => write!(f, "calendar_scheduling"),
            IntentCategory::WebSearch => write!(f, "web_search"),
            IntentCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for IntentCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_generation" => Ok(IntentCategory::DocumentGeneration),
            "email_composition" => Ok(IntentCategory::EmailComposition),
            "calendar_scheduling" => Ok(IntentCategory::CalendarScheduling),
            "web_search" => Ok(IntentCategory::WebSearch),
            "unknown" => Ok(IntentCategory::Unknown),
            _ => Err(format!("Unknown intent category: {}", s)),
        }
    }
}

/// Kind of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ToolCall,
    UserResponse,
    ParameterRequest,
    Completion,
    Error,
}

/// Priority of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Result returned by the external tool executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Parameters,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Parameters::new(),
        }
    }
}

/// One append-only record in a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool_name: Option<String>,
    pub parameters: Parameters,
    pub tool_result: Option<ToolResult>,
    pub user_input: String,
    pub ai_response: Option<String>,
    pub kind: EntryKind,
}

impl ContextEntry {
    pub fn new(kind: EntryKind, user_input: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tool_name: None,
            parameters: Parameters::new(),
            tool_result: None,
            user_input: user_input.to_string(),
            ai_response: None,
            kind,
        }
    }
}

/// An operation that was started but has not completed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: Uuid,
    pub tool_name: String,
    pub collected_parameters: Parameters,
    pub missing_parameters: Vec<String>,
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
}

/// One step of a multi-turn pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTurnStep {
    pub name: String,
    pub prompt: String,
}

/// Progress through a registered multi-turn pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTurnIntent {
    pub intent: IntentCategory,
    pub current_step: usize,
    pub total_steps: usize,
    pub steps: Vec<MultiTurnStep>,
    pub collected_data: Parameters,
    pub next_expected_input: Option<String>,
}

/// Mutable working state of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveContext {
    pub current_tool: Option<String>,
    pub pending_parameters: Parameters,
    pub required_parameters: Vec<String>,
    pub contextual_information: Parameters,
    pub session_state: SessionState,
    pub multi_turn_intent: Option<MultiTurnIntent>,
}

impl ActiveContext {
    /// Drop required names that are already pending, and duplicates.
    pub fn normalize(&mut self) {
        let pending = &self.pending_parameters;
        let mut seen = Vec::with_capacity(self.required_parameters.len());
        self.required_parameters.retain(|name| {
            if pending.contains_key(name) || seen.contains(name) {
                false
            } else {
                seen.push(name.clone());
                true
            }
        });
    }

    /// Clear the in-flight operation, keeping enrichment signals.
    pub fn reset_operation(&mut self) {
        let contextual_information = std::mem::take(&mut self.contextual_information);
        *self = ActiveContext {
            contextual_information,
            ..ActiveContext::default()
        };
    }

    /// Clear everything, enrichment signals included.
    pub fn reset_all(&mut self) {
        *self = ActiveContext::default();
    }

    /// Name of the next parameter the user is expected to supply.
    pub fn next_required(&self) -> Option<&str> {
        self.required_parameters.first().map(String::as_str)
    }
}

/// The full state for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub active_context: ActiveContext,
    pub context_history: Vec<ContextEntry>,
    pub pending_operations: Vec<PendingOperation>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConversationContext {
    /// Create an empty idle context.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            active_context: ActiveContext::default(),
            context_history: Vec::new(),
            pending_operations: Vec::new(),
            created_at: now,
            last_updated: now,
            expires_at: None,
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.active_context.session_state
    }

    /// Whether this context is past its TTL (or explicit expiry) at `now`.
    ///
    /// A deadline beyond chrono's range never passes.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => match self.last_updated.checked_add_signed(ttl) {
                Some(deadline) => deadline < now,
                None => false,
            },
        }
    }

    /// Append a history entry. History is never rewritten.
    pub fn push_entry(&mut self, entry: ContextEntry) {
        self.context_history.push(entry);
    }
}

/// Output of the command analyzer for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAnalysis {
    pub original_text: String,
    pub intent: IntentCategory,
    pub tool_name: Option<String>,
    pub provided_parameters: Parameters,
    pub missing_parameters: Vec<String>,
    pub confidence: f32,
    #[serde(default)]
    pub priority: Priority,
}

/// Response handed back to the voice/UI layer for each turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualResponse {
    pub message: String,
    pub needs_user_input: bool,
    pub session_state: SessionState,
    pub suggested_actions: Vec<String>,
}

/// A message from the external conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub ai_provider: Option<String>,
    pub processing_time_ms: Option<f64>,
}

/// Aggregate statistics over every live context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub active_contexts: usize,
    pub total_history_entries: usize,
    pub pending_operations: usize,
    pub average_context_age_secs: f64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_display_and_parse() {
        for state in [
            SessionState::Idle,
            SessionState::CollectingParameters,
            SessionState::Executing,
            SessionState::AwaitingConfirmation,
            SessionState::Error,
        ] {
            let parsed: SessionState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("sleeping".parse::<SessionState>().is_err());
    }

    #[test]
    fn test_session_state_serde_snake_case() {
        let json = serde_json::to_string(&SessionState::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
    }

    #[test]
    fn test_intent_category_parse() {
        assert_eq!(
            "email_composition".parse::<IntentCategory>().unwrap(),
            IntentCategory::EmailComposition
        );
        assert!("dance".parse::<IntentCategory>().is_err());
    }

    #[test]
    fn test_param_value_serializes_as_plain_json() {
        let mut map = BTreeMap::new();
        map.insert("n".to_string(), ParamValue::Number(2.5));
        let value = ParamValue::List(vec![
            ParamValue::from("a"),
            ParamValue::Bool(true),
            ParamValue::Map(map),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!(["a", true, {"n": 2.5}]));

        let back: ParamValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_param_value_display() {
        let list = ParamValue::from(vec!["a@x.com".to_string(), "b@y.com".to_string()]);
        assert_eq!(list.to_string(), "a@x.com, b@y.com");
        assert_eq!(ParamValue::from("pdf").to_string(), "pdf");
    }

    #[test]
    fn test_new_context_is_idle_and_empty() {
        let ctx = ConversationContext::new("conv-1");
        assert_eq!(ctx.session_state(), SessionState::Idle);
        assert!(ctx.active_context.pending_parameters.is_empty());
        assert!(ctx.context_history.is_empty());
        assert!(ctx.pending_operations.is_empty());
        assert!(ctx.expires_at.is_none());
    }

    #[test]
    fn test_normalize_drops_satisfied_and_duplicate_names() {
        let mut active = ActiveContext::default();
        active
            .pending_parameters
            .insert("content".to_string(), ParamValue::from("report"));
        active.required_parameters = vec![
            "content".to_string(),
            "format".to_string(),
            "format".to_string(),
        ];
        active.normalize();
        assert_eq!(active.required_parameters, vec!["format".to_string()]);
    }

    #[test]
    fn test_reset_operation_keeps_contextual_information() {
        let mut active = ActiveContext {
            current_tool: Some("web_search".to_string()),
            session_state: SessionState::Error,
            ..ActiveContext::default()
        };
        active
            .contextual_information
            .insert("preferred_format".to_string(), ParamValue::from("pdf"));

        active.reset_operation();
        assert!(active.current_tool.is_none());
        assert_eq!(active.session_state, SessionState::Idle);
        assert_eq!(active.contextual_information.len(), 1);

        active.reset_all();
        assert!(active.contextual_information.is_empty());
    }

    #[test]
    fn test_is_expired_uses_ttl_or_override() {
        let ttl = chrono::Duration::seconds(60);
        let mut ctx = ConversationContext::new("c");
        let now = Utc::now();
        assert!(!ctx.is_expired(now, ttl));

        ctx.last_updated = now - chrono::Duration::seconds(120);
        assert!(ctx.is_expired(now, ttl));

        ctx.expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(!ctx.is_expired(now, ttl));
    }

    #[test]
    fn test_is_expired_survives_deadline_overflow() {
        let mut ctx = ConversationContext::new("c");
        ctx.last_updated = DateTime::<Utc>::MAX_UTC;
        assert!(!ctx.is_expired(Utc::now(), chrono::Duration::seconds(60)));

        let fresh = ConversationContext::new("d");
        assert!(!fresh.is_expired(Utc::now(), chrono::Duration::MAX));
    }
}
