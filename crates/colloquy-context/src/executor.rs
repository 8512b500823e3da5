//! Seams to the outside world: tool execution and conversation history.
//!
//! The engine never performs a tool's side effect itself. It hands the tool
//! name and collected arguments to a [`ToolExecutor`] and reads recent
//! messages through a [`HistoryProvider`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ToolError;
use crate::types::{HistoryMessage, Parameters, ToolResult};

/// Runs a named tool with collected arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, arguments: &Parameters)
        -> Result<ToolResult, ToolError>;
}

/// Supplies the external message history of a conversation.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Messages in chronological order.
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<HistoryMessage>, ToolError>;
}

/// Executor that logs the call and reports success without side effects.
pub struct DryRunExecutor;

#[async_trait]
impl ToolExecutor for DryRunExecutor {
    async fn execute(
        &self,
        tool_name: &str,
        arguments: &Parameters,
    ) -> Result<ToolResult, ToolError> {
        if tool_name.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "tool name must not be empty".to_string(),
            ));
        }

        let summary: Vec<String> = arguments
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        tracing::info!(tool = %tool_name, arguments = %summary.join(" "), "Tool executed (dry run)");

        let mut result = ToolResult::ok(format!("{} completed.", tool_name.replace('_', " ")));
        result.data = arguments.clone();
        Ok(result)
    }
}

/// History provider backed by an in-process map.
#[derive(Default)]
pub struct InMemoryHistory {
    messages: Mutex<HashMap<String, Vec<HistoryMessage>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a conversation's history.
    pub fn record(&self, conversation_id: &str, message: HistoryMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(message);
        }
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHistory {
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<HistoryMessage>, ToolError> {
        let messages = self
            .messages
            .lock()
            .map_err(|e| ToolError::Unavailable(format!("history lock poisoned: {}", e)))?;
        Ok(messages.get(conversation_id).cloned().unwrap_or_default())
    }
}
