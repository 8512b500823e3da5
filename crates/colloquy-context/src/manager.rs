//! Context manager: the façade wiring store, analyzer, session loop,
//! enricher and cleanup together.
//!
//! One call to [`ContextManager::process_command`] is one conversational
//! turn. The tool executor is always awaited with no context lock held.

use std::sync::Arc;
use std::time::Duration;

use colloquy_core::config::ConversationConfig;
use tracing::{debug, info, warn};

use crate::cleanup::{CleanupHandle, CleanupScheduler};
use crate::enricher::ContextEnricher;
use crate::error::{ContextError, ToolError};
use crate::executor::{HistoryProvider, ToolExecutor};
use crate::intent::catalog::ToolCatalog;
use crate::intent::patterns::PatternRegistry;
use crate::intent::CommandAnalyzer;
use crate::session::{ExecutionRequest, SessionMachine, TurnOutcome};
use crate::store::ContextStore;
use crate::types::{
    ContextEntry, ContextStats, ContextualResponse, ConversationContext, HistoryMessage,
    Parameters, SessionState,
};

/// Entry point for every conversation operation.
pub struct ContextManager {
    store: Arc<ContextStore>,
    analyzer: CommandAnalyzer,
    machine: SessionMachine,
    enricher: ContextEnricher,
    executor: Arc<dyn ToolExecutor>,
    history: Option<Arc<dyn HistoryProvider>>,
    max_message_length: usize,
    cleanup_interval: Duration,
}

impl ContextManager {
    /// Build a manager from configuration with the built-in tool catalog.
    ///
    /// Fails if the configured multi-turn patterns are invalid.
    pub fn new(
        config: &ConversationConfig,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<Self, ContextError> {
        let patterns = PatternRegistry::from_config(&config.patterns)?;
        Ok(Self::with_components(
            config,
            executor,
            ToolCatalog::builtin(),
            patterns,
        ))
    }

    /// Build a manager with an explicit catalog and pattern table.
    pub fn with_components(
        config: &ConversationConfig,
        executor: Arc<dyn ToolExecutor>,
        catalog: ToolCatalog,
        patterns: PatternRegistry,
    ) -> Self {
        Self {
            store: Arc::new(ContextStore::new(Duration::from_secs(config.context_ttl_secs))),
            analyzer: CommandAnalyzer::new(catalog),
            machine: SessionMachine::new(patterns),
            enricher: ContextEnricher::new(config.enrichment_window),
            executor,
            history: None,
            max_message_length: config.max_message_length,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }

    /// Read enrichment signals from an external history instead of the
    /// context's own entries.
    pub fn with_history_provider(mut self, provider: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(provider);
        self
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Process one user utterance for `conversation_id`.
    pub async fn process_command(
        &self,
        text: &str,
        conversation_id: &str,
    ) -> Result<ContextualResponse, ContextError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::ParameterExtractionFailed(
                "input is empty".to_string(),
            ));
        }
        if text.chars().count() > self.max_message_length {
            return Err(ContextError::MessageTooLong(self.max_message_length));
        }
        if conversation_id.trim().is_empty() {
            return Err(ContextError::InvalidState(
                "conversation id must not be empty".to_string(),
            ));
        }

        self.store.ensure_exists(conversation_id)?;

        if let Err(e) = self.enrich_context(conversation_id).await {
            warn!(conversation_id = %conversation_id, error = %e, "Enrichment skipped");
        }

        let outcome = self.store.update_with(conversation_id, |ctx| {
            let analysis = self.analyzer.analyze(text, &ctx.active_context)?;
            debug!(
                conversation_id = %conversation_id,
                state = %ctx.session_state(),
                intent = %analysis.intent,
                confidence = analysis.confidence,
                missing = analysis.missing_parameters.len(),
                "Command analyzed"
            );
            self.machine.step(ctx, analysis)
        })?;

        match outcome {
            TurnOutcome::Reply(response) => Ok(response),
            TurnOutcome::Execute(request) => self.execute(conversation_id, request).await,
        }
    }

    /// Run a tool with `Executing` already committed, then fold the outcome
    /// back into the context.
    ///
    /// If this future is dropped mid-call the session is moved to `Error`
    /// so the conversation can recover.
    async fn execute(
        &self,
        conversation_id: &str,
        request: ExecutionRequest,
    ) -> Result<ContextualResponse, ContextError> {
        info!(
            conversation_id = %conversation_id,
            tool = %request.tool_name,
            "Executing tool"
        );
        let guard = InterruptGuard {
            manager: self,
            conversation_id,
            request: &request,
            armed: true,
        };
        let outcome = self
            .executor
            .execute(&request.tool_name, &request.arguments)
            .await;
        guard.disarm();

        let completion = self.store.update_existing_with(conversation_id, |ctx| {
            self.machine.complete(ctx, &request, outcome)
        })?;

        match completion.failure {
            None => {
                info!(
                    conversation_id = %conversation_id,
                    tool = %request.tool_name,
                    "Tool completed"
                );
                Ok(completion.response)
            }
            Some(message) => {
                warn!(
                    conversation_id = %conversation_id,
                    tool = %request.tool_name,
                    error = %message,
                    "Tool execution failed"
                );
                Err(ContextError::ToolExecutionFailed {
                    tool: request.tool_name,
                    message,
                    response: Box::new(completion.response),
                })
            }
        }
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    /// Refresh `contextual_information` from recent history.
    ///
    /// Returns the signals written. A failing history provider contributes
    /// nothing.
    pub async fn enrich_context(&self, conversation_id: &str) -> Result<Parameters, ContextError> {
        let ctx = self.require(conversation_id)?;

        let messages = match &self.history {
            Some(provider) => match provider.get_messages(conversation_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(conversation_id = %conversation_id, error = %e, "History provider failed");
                    Vec::new()
                }
            },
            None => messages_from_entries(&ctx.context_history),
        };

        let enricher = &self.enricher;
        self.store.update_existing_with(conversation_id, |ctx| {
            let signals = enricher.compute(&messages, &ctx.context_history);
            for (key, value) in &signals {
                ctx.active_context
                    .contextual_information
                    .insert(key.clone(), value.clone());
            }
            Ok(signals)
        })
    }

    // =========================================================================
    // Queries and administration
    // =========================================================================

    fn require(&self, conversation_id: &str) -> Result<ConversationContext, ContextError> {
        self.store
            .get(conversation_id)?
            .ok_or_else(|| ContextError::ContextNotFound(conversation_id.to_string()))
    }

    pub fn get_context(&self, conversation_id: &str) -> Result<ConversationContext, ContextError> {
        self.require(conversation_id)
    }

    pub fn get_history(&self, conversation_id: &str) -> Result<Vec<ContextEntry>, ContextError> {
        Ok(self.require(conversation_id)?.context_history)
    }

    pub fn get_session_state(&self, conversation_id: &str) -> Result<SessionState, ContextError> {
        Ok(self.require(conversation_id)?.session_state())
    }

    pub fn get_pending_parameters(
        &self,
        conversation_id: &str,
    ) -> Result<Parameters, ContextError> {
        Ok(self.require(conversation_id)?.active_context.pending_parameters)
    }

    /// Drop a conversation. Returns whether it existed.
    pub fn clear_context(&self, conversation_id: &str) -> Result<bool, ContextError> {
        let existed = self.store.clear(conversation_id)?;
        if existed {
            info!(conversation_id = %conversation_id, "Context cleared");
        }
        Ok(existed)
    }

    pub fn export_context(&self, conversation_id: &str) -> Result<String, ContextError> {
        self.store.export(conversation_id)
    }

    /// Import an exported context. Malformed input is logged and rejected.
    pub fn import_context(&self, serialized: &str) -> bool {
        match self.store.import(serialized) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Context import rejected");
                false
            }
        }
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.store.ids()
    }

    pub fn stats(&self) -> ContextStats {
        self.store.stats()
    }

    /// Start the background cleanup loop for this manager's store.
    pub fn spawn_cleanup(&self) -> CleanupHandle {
        CleanupScheduler::new(Arc::clone(&self.store), self.cleanup_interval).spawn()
    }
}

/// Settles a tool call whose turn was abandoned before the executor returned.
struct InterruptGuard<'a> {
    manager: &'a ContextManager,
    conversation_id: &'a str,
    request: &'a ExecutionRequest,
    armed: bool,
}

impl InterruptGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            conversation_id = %self.conversation_id,
            tool = %self.request.tool_name,
            "Tool call abandoned before completion"
        );
        let settled = self
            .manager
            .store
            .update_existing_with(self.conversation_id, |ctx| {
                self.manager
                    .machine
                    .complete(ctx, self.request, Err(ToolError::Interrupted))
            });
        if let Err(e) = settled {
            warn!(conversation_id = %self.conversation_id, error = %e, "Could not settle abandoned tool call");
        }
    }
}

/// Rebuild a message list from the context's own history entries.
fn messages_from_entries(entries: &[ContextEntry]) -> Vec<HistoryMessage> {
    let mut messages = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        messages.push(HistoryMessage {
            role: "user".to_string(),
            content: entry.user_input.clone(),
            ai_provider: None,
            processing_time_ms: None,
        });
        if let Some(reply) = &entry.ai_response {
            messages.push(HistoryMessage {
                role: "assistant".to_string(),
                content: reply.clone(),
                ai_provider: None,
                processing_time_ms: None,
            });
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::enricher::{FREQUENT_TOOL, PREFERRED_FORMAT, PREFERRED_PROVIDER};
    use crate::error::ToolError;
    use crate::executor::InMemoryHistory;
    use crate::types::{EntryKind, ParamValue, ToolResult};

    // ---- Test collaborators ----

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, Parameters)>>,
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<(String, Parameters)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(
            &self,
            tool_name: &str,
            arguments: &Parameters,
        ) -> Result<ToolResult, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), arguments.clone()));
            Ok(ToolResult::ok(format!("{} finished", tool_name)))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ToolExecutor for FailingExecutor {
        async fn execute(&self, _: &str, _: &Parameters) -> Result<ToolResult, ToolError> {
            Err(ToolError::Unavailable("backend offline".to_string()))
        }
    }

    /// Blocks inside `execute` until released.
    #[derive(Default)]
    struct GatedExecutor {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ToolExecutor for GatedExecutor {
        async fn execute(&self, _: &str, _: &Parameters) -> Result<ToolResult, ToolError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(ToolResult::ok("released"))
        }
    }

    fn manager_with(executor: Arc<dyn ToolExecutor>) -> ContextManager {
        ContextManager::new(&ConversationConfig::default(), executor).unwrap()
    }

    async fn drive_to_confirmation(manager: &ContextManager, id: &str) {
        manager.process_command("Generate a document", id).await.unwrap();
        manager.process_command("A report about Q3", id).await.unwrap();
        let r = manager.process_command("PDF", id).await.unwrap();
        assert_eq!(r.session_state, SessionState::AwaitingConfirmation);
    }

    // =========================================================================
    // Scenarios
    // =========================================================================

    #[tokio::test]
    async fn test_document_generation_flow() {
        let executor = Arc::new(RecordingExecutor::default());
        let manager = manager_with(executor.clone());

        let r = manager.process_command("Generate a document", "c1").await.unwrap();
        assert_eq!(r.session_state, SessionState::CollectingParameters);
        assert!(r.needs_user_input);

        let r = manager.process_command("A report about Q3", "c1").await.unwrap();
        assert_eq!(r.session_state, SessionState::CollectingParameters);
        assert!(r.suggested_actions.contains(&"PDF".to_string()));

        let r = manager.process_command("PDF", "c1").await.unwrap();
        assert_eq!(r.session_state, SessionState::AwaitingConfirmation);
        assert!(r.message.contains("A report about Q3"));
        assert!(r.message.contains("pdf"));

        let r = manager.process_command("Yes", "c1").await.unwrap();
        assert_eq!(r.session_state, SessionState::Idle);
        assert!(!r.needs_user_input);

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "generate_document");
        let mut expected = Parameters::new();
        expected.insert("content".to_string(), ParamValue::from("A report about Q3"));
        expected.insert("format".to_string(), ParamValue::from("pdf"));
        assert_eq!(calls[0].1, expected);

        assert_eq!(manager.get_session_state("c1").unwrap(), SessionState::Idle);
        assert!(manager.get_pending_parameters("c1").unwrap().is_empty());
        let kinds: Vec<EntryKind> = manager
            .get_history("c1")
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds.first(), Some(&EntryKind::ParameterRequest));
        assert_eq!(kinds.last(), Some(&EntryKind::Completion));
    }

    #[tokio::test]
    async fn test_cancellation_at_confirmation() {
        let executor = Arc::new(RecordingExecutor::default());
        let manager = manager_with(executor.clone());
        drive_to_confirmation(&manager, "c2").await;

        let r = manager.process_command("no", "c2").await.unwrap();
        assert_eq!(r.session_state, SessionState::Idle);
        assert!(r.message.contains("cancelled"));
        assert!(manager.get_pending_parameters("c2").unwrap().is_empty());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_error_recovery() {
        let manager = manager_with(Arc::new(FailingExecutor));
        drive_to_confirmation(&manager, "c3").await;

        let err = manager.process_command("Yes", "c3").await.unwrap_err();
        let response = err.recovery_response().cloned().unwrap();
        assert!(matches!(err, ContextError::ToolExecutionFailed { ref tool, .. } if tool == "generate_document"));
        assert_eq!(response.session_state, SessionState::Error);
        assert_eq!(response.suggested_actions, vec!["try again", "start over", "cancel"]);
        assert_eq!(manager.get_session_state("c3").unwrap(), SessionState::Error);

        let r = manager.process_command("try again", "c3").await.unwrap();
        assert_eq!(r.session_state, SessionState::CollectingParameters);

        // Back to error, then start over.
        manager.process_command("continue", "c3").await.unwrap();
        assert!(manager.process_command("yes", "c3").await.is_err());
        let r = manager.process_command("start over", "c3").await.unwrap();
        assert_eq!(r.session_state, SessionState::Idle);

        let ctx = manager.get_context("c3").unwrap();
        assert!(ctx.active_context.current_tool.is_none());
        assert!(ctx.active_context.pending_parameters.is_empty());
        assert!(ctx.active_context.contextual_information.is_empty());
        assert!(ctx.pending_operations.is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_confirmation() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        drive_to_confirmation(&manager, "c4").await;

        let r = manager.process_command("maybe", "c4").await.unwrap();
        assert_eq!(r.session_state, SessionState::AwaitingConfirmation);
        assert!(r.needs_user_input);
        assert!(r.message.contains("Shall I go ahead?"));
    }

    #[tokio::test]
    async fn test_email_recipients_reach_pending_parameters() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        let r = manager
            .process_command("email john@x.com and sarah@y.com about the budget", "c5")
            .await
            .unwrap();
        assert_eq!(r.session_state, SessionState::CollectingParameters);

        let pending = manager.get_pending_parameters("c5").unwrap();
        assert_eq!(
            pending.get("to"),
            Some(&ParamValue::from(vec![
                "john@x.com".to_string(),
                "sarah@y.com".to_string()
            ]))
        );
    }

    // =========================================================================
    // Execution and concurrency
    // =========================================================================

    #[tokio::test]
    async fn test_complete_search_executes_immediately() {
        let executor = Arc::new(RecordingExecutor::default());
        let manager = manager_with(executor.clone());
        let r = manager
            .process_command("search for rust async runtimes", "s1")
            .await
            .unwrap();
        assert_eq!(r.session_state, SessionState::Idle);
        assert_eq!(r.message, "Done! web_search finished");
        assert_eq!(executor.calls()[0].0, "web_search");
    }

    #[tokio::test]
    async fn test_busy_while_executing() {
        let executor = Arc::new(GatedExecutor::default());
        let manager = Arc::new(manager_with(executor.clone()));

        let running = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.process_command("search for tokio", "b1").await })
        };
        executor.started.notified().await;

        assert_eq!(manager.get_session_state("b1").unwrap(), SessionState::Executing);
        let r = manager.process_command("are you done?", "b1").await.unwrap();
        assert_eq!(r.session_state, SessionState::Executing);
        assert!(r.message.contains("Please wait"));

        executor.release.notify_one();
        let finished = running.await.unwrap().unwrap();
        assert_eq!(finished.session_state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_abandoned_turn_moves_to_error() {
        let executor = Arc::new(GatedExecutor::default());
        let manager = Arc::new(manager_with(executor.clone()));

        let running = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.process_command("search for tokio", "ab1").await })
        };
        executor.started.notified().await;
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        assert_eq!(manager.get_session_state("ab1").unwrap(), SessionState::Error);
        let pending = manager.get_pending_parameters("ab1").unwrap();
        assert_eq!(pending.get("query"), Some(&ParamValue::from("tokio")));

        let r = manager.process_command("start over", "ab1").await.unwrap();
        assert_eq!(r.session_state, SessionState::Idle);
        assert!(manager.get_context("ab1").unwrap().pending_operations.is_empty());
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        manager.process_command("Generate a document", "a").await.unwrap();
        manager.process_command("tell me a joke", "b").await.unwrap();
        assert_eq!(
            manager.get_session_state("a").unwrap(),
            SessionState::CollectingParameters
        );
        assert_eq!(manager.get_session_state("b").unwrap(), SessionState::Idle);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[tokio::test]
    async fn test_rejects_blank_and_oversized_input() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        assert!(matches!(
            manager.process_command("   ", "v").await,
            Err(ContextError::ParameterExtractionFailed(_))
        ));
        let long = "a".repeat(2001);
        assert!(matches!(
            manager.process_command(&long, "v").await,
            Err(ContextError::MessageTooLong(2000))
        ));
        assert!(manager.conversation_ids().is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_break_turns() {
        let config = ConversationConfig {
            context_ttl_secs: 100_000_000_000_000,
            ..ConversationConfig::default()
        };
        let manager = ContextManager::new(&config, Arc::new(RecordingExecutor::default())).unwrap();
        let r = manager.process_command("Generate a document", "t1").await.unwrap();
        assert_eq!(r.session_state, SessionState::CollectingParameters);
        assert_eq!(manager.conversation_ids(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_future_dated_import_is_rejected() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        manager.process_command("Generate a document", "live").await.unwrap();

        let mut ctx = ConversationContext::new("future");
        ctx.last_updated = chrono::Utc::now() + chrono::Duration::days(365 * 1000);
        assert!(!manager.import_context(&serde_json::to_string(&ctx).unwrap()));
        assert_eq!(manager.conversation_ids(), vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_conversation_queries_fail() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        assert!(matches!(
            manager.get_history("ghost"),
            Err(ContextError::ContextNotFound(_))
        ));
        assert!(!manager.clear_context("ghost").unwrap());
    }

    // =========================================================================
    // Persistence and enrichment
    // =========================================================================

    #[tokio::test]
    async fn test_export_import_round_trip_mid_flow() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        manager.process_command("Generate a document", "r1").await.unwrap();
        manager.process_command("A report about Q3", "r1").await.unwrap();
        let original = manager.get_context("r1").unwrap();
        let json = manager.export_context("r1").unwrap();

        let other = manager_with(Arc::new(RecordingExecutor::default()));
        assert!(other.import_context(&json));
        assert_eq!(other.get_context("r1").unwrap(), original);

        let r = other.process_command("PDF", "r1").await.unwrap();
        assert_eq!(r.session_state, SessionState::AwaitingConfirmation);
        assert!(!other.import_context("not json"));
    }

    #[tokio::test]
    async fn test_enrichment_from_history_provider() {
        let history = Arc::new(InMemoryHistory::new());
        history.record(
            "e1",
            HistoryMessage {
                role: "user".to_string(),
                content: "last time I wanted it in html".to_string(),
                ai_provider: None,
                processing_time_ms: None,
            },
        );
        history.record(
            "e1",
            HistoryMessage {
                role: "assistant".to_string(),
                content: "Here it is".to_string(),
                ai_provider: Some("openai".to_string()),
                processing_time_ms: Some(42.0),
            },
        );
        let manager = manager_with(Arc::new(RecordingExecutor::default()))
            .with_history_provider(history);

        manager.process_command("tell me a joke", "e1").await.unwrap();
        let info = manager
            .get_context("e1")
            .unwrap()
            .active_context
            .contextual_information;
        assert_eq!(info.get(PREFERRED_FORMAT), Some(&ParamValue::from("html")));
        assert_eq!(info.get(PREFERRED_PROVIDER), Some(&ParamValue::from("openai")));
    }

    #[tokio::test]
    async fn test_enrichment_from_own_history() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        manager.process_command("search for tokio", "e2").await.unwrap();
        let signals = manager.enrich_context("e2").await.unwrap();
        assert_eq!(signals.get(FREQUENT_TOOL), Some(&ParamValue::from("web_search")));
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        manager.process_command("Generate a document", "x").await.unwrap();
        manager.process_command("Generate a document", "y").await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.active_contexts, 2);
        assert_eq!(stats.pending_operations, 2);
        assert_eq!(stats.total_history_entries, 2);

        assert!(manager.clear_context("x").unwrap());
        assert_eq!(manager.stats().active_contexts, 1);
    }

    #[tokio::test]
    async fn test_spawn_cleanup_stops() {
        let manager = manager_with(Arc::new(RecordingExecutor::default()));
        let handle = manager.spawn_cleanup();
        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("Cleanup should stop within timeout");
    }
}
