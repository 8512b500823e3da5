//! Conversation session loop.
//!
//! Applies one analyzed utterance to a conversation context. Each turn
//! either produces a reply straight away or commits the `Executing` state
//! and hands back an [`ExecutionRequest`]; the caller runs the tool outside
//! the context lock and reports the outcome through
//! [`SessionMachine::complete`].

pub mod prompts;
pub mod state_machine;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ContextError, ToolError};
use crate::intent::fill_expected;
use crate::intent::patterns::PatternRegistry;
use crate::types::{
    CommandAnalysis, ContextEntry, ContextualResponse, ConversationContext, EntryKind,
    Parameters, PendingOperation, SessionState, ToolResult,
};

use prompts::{ConfirmationReply, RecoveryChoice, ReplyClassifier};
use state_machine::transition;

/// A tool call the caller must run before the turn can finish.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub tool_name: String,
    pub arguments: Parameters,
    pub user_input: String,
}

/// Result of applying one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply(ContextualResponse),
    Execute(ExecutionRequest),
}

/// Result of reporting a tool outcome back to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response: ContextualResponse,
    /// Set when the tool failed and the session moved to `Error`.
    pub failure: Option<String>,
}

/// Drives the per-conversation state machine.
pub struct SessionMachine {
    patterns: PatternRegistry,
    replies: ReplyClassifier,
}

impl SessionMachine {
    pub fn new(patterns: PatternRegistry) -> Self {
        Self {
            patterns,
            replies: ReplyClassifier::new(),
        }
    }

    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    /// Apply one analyzed utterance to `ctx`.
    pub fn step(
        &self,
        ctx: &mut ConversationContext,
        analysis: CommandAnalysis,
    ) -> Result<TurnOutcome, ContextError> {
        match ctx.session_state() {
            SessionState::Idle => self.on_idle(ctx, analysis),
            SessionState::CollectingParameters => self.on_collecting(ctx, analysis),
            SessionState::AwaitingConfirmation => self.on_awaiting_confirmation(ctx, analysis),
            SessionState::Executing => {
                transition(&mut ctx.active_context, SessionState::Executing)?;
                Ok(TurnOutcome::Reply(reply(
                    prompts::busy(),
                    false,
                    SessionState::Executing,
                    Vec::new(),
                )))
            }
            SessionState::Error => self.on_error(ctx, analysis),
        }
    }

    // ---- Idle ----

    fn on_idle(
        &self,
        ctx: &mut ConversationContext,
        analysis: CommandAnalysis,
    ) -> Result<TurnOutcome, ContextError> {
        let tool_name = match analysis.tool_name.clone() {
            Some(tool) => tool,
            None => {
                let message = prompts::not_understood();
                let mut entry = ContextEntry::new(EntryKind::UserResponse, &analysis.original_text);
                entry.ai_response = Some(message.clone());
                ctx.push_entry(entry);
                return Ok(TurnOutcome::Reply(reply(
                    message,
                    true,
                    SessionState::Idle,
                    prompts::capability_suggestions(),
                )));
            }
        };

        let active = &mut ctx.active_context;
        active.current_tool = Some(tool_name.clone());
        active.pending_parameters = analysis.provided_parameters.clone();
        active.required_parameters = analysis.missing_parameters.clone();
        active.normalize();

        let pattern = self.patterns.get(analysis.intent);

        if pattern.is_none() && active.required_parameters.is_empty() {
            transition(active, SessionState::Executing)?;
            ctx.pending_operations.push(PendingOperation {
                id: Uuid::new_v4(),
                tool_name: tool_name.clone(),
                collected_parameters: analysis.provided_parameters.clone(),
                missing_parameters: Vec::new(),
                prompt: None,
                created_at: Utc::now(),
                priority: analysis.priority,
            });
            return Ok(TurnOutcome::Execute(self.begin_execution(ctx, &analysis.original_text)?));
        }

        transition(active, SessionState::CollectingParameters)?;

        // The pattern's opening question only fits when nothing was given yet.
        let prompt = match pattern {
            Some(pattern) => {
                active.multi_turn_intent = Some(pattern.seed(&active.pending_parameters));
                match pattern.first_prompt() {
                    Some(first) if active.pending_parameters.is_empty() => first.to_string(),
                    _ => next_prompt(&active.required_parameters),
                }
            }
            None => next_prompt(&active.required_parameters),
        };
        let suggestions = ctx
            .active_context
            .next_required()
            .map(prompts::parameter_suggestions)
            .unwrap_or_else(|| vec!["cancel".to_string()]);

        ctx.pending_operations.push(PendingOperation {
            id: Uuid::new_v4(),
            tool_name: tool_name.clone(),
            collected_parameters: ctx.active_context.pending_parameters.clone(),
            missing_parameters: ctx.active_context.required_parameters.clone(),
            prompt: Some(prompt.clone()),
            created_at: Utc::now(),
            priority: analysis.priority,
        });

        let mut entry = ContextEntry::new(EntryKind::ParameterRequest, &analysis.original_text);
        entry.tool_name = Some(tool_name);
        entry.parameters = ctx.active_context.pending_parameters.clone();
        entry.ai_response = Some(prompt.clone());
        ctx.push_entry(entry);

        Ok(TurnOutcome::Reply(reply(
            prompt,
            true,
            SessionState::CollectingParameters,
            suggestions,
        )))
    }

    // ---- Collecting parameters ----

    fn on_collecting(
        &self,
        ctx: &mut ConversationContext,
        mut analysis: CommandAnalysis,
    ) -> Result<TurnOutcome, ContextError> {
        if self.replies.is_cancel_phrase(&analysis.original_text) {
            return self.cancel(ctx, &analysis.original_text);
        }

        let tool_name = current_tool(ctx)?;

        if let Some(expected) = ctx.active_context.next_required().map(str::to_string) {
            fill_expected(&mut analysis, &expected);
        }

        let active = &mut ctx.active_context;
        let before = active.pending_parameters.len();
        for (name, value) in analysis.provided_parameters {
            active.pending_parameters.insert(name, value);
        }
        active.normalize();
        let progressed = active.pending_parameters.len() > before;

        let done = active.required_parameters.is_empty();
        if let Some(progress) = active.multi_turn_intent.as_mut() {
            if done {
                progress.current_step = progress.total_steps.saturating_sub(1);
            } else if progressed {
                progress.current_step = (progress.current_step + 1)
                    .min(progress.total_steps.saturating_sub(1));
            }
            progress.collected_data = active.pending_parameters.clone();
            progress.next_expected_input = active
                .required_parameters
                .first()
                .cloned()
                .or_else(|| Some("confirmation".to_string()));
        }

        let (message, state, suggestions) = if done {
            transition(active, SessionState::AwaitingConfirmation)?;
            (
                prompts::confirmation_summary(&tool_name, &active.pending_parameters),
                SessionState::AwaitingConfirmation,
                prompts::confirmation_suggestions(),
            )
        } else {
            transition(active, SessionState::CollectingParameters)?;
            let next = active.required_parameters[0].clone();
            (
                prompts::parameter_prompt(&next),
                SessionState::CollectingParameters,
                prompts::parameter_suggestions(&next),
            )
        };

        let collected = ctx.active_context.pending_parameters.clone();
        let missing = ctx.active_context.required_parameters.clone();
        if let Some(op) = ctx
            .pending_operations
            .iter_mut()
            .rev()
            .find(|op| op.tool_name == tool_name)
        {
            op.collected_parameters = collected.clone();
            op.missing_parameters = missing;
            op.prompt = Some(message.clone());
        }

        let mut entry = ContextEntry::new(EntryKind::UserResponse, &analysis.original_text);
        entry.tool_name = Some(tool_name);
        entry.parameters = collected;
        entry.ai_response = Some(message.clone());
        ctx.push_entry(entry);

        Ok(TurnOutcome::Reply(reply(message, true, state, suggestions)))
    }

    // ---- Awaiting confirmation ----

    fn on_awaiting_confirmation(
        &self,
        ctx: &mut ConversationContext,
        analysis: CommandAnalysis,
    ) -> Result<TurnOutcome, ContextError> {
        match self.replies.confirmation(&analysis.original_text) {
            ConfirmationReply::Confirm => {
                transition(&mut ctx.active_context, SessionState::Executing)?;
                Ok(TurnOutcome::Execute(
                    self.begin_execution(ctx, &analysis.original_text)?,
                ))
            }
            ConfirmationReply::Cancel => self.cancel(ctx, &analysis.original_text),
            ConfirmationReply::Ambiguous => {
                let tool_name = current_tool(ctx)?;
                transition(&mut ctx.active_context, SessionState::AwaitingConfirmation)?;
                let message = format!(
                    "Sorry, I didn't catch that. {}",
                    prompts::confirmation_summary(
                        &tool_name,
                        &ctx.active_context.pending_parameters
                    )
                );
                Ok(TurnOutcome::Reply(reply(
                    message,
                    true,
                    SessionState::AwaitingConfirmation,
                    prompts::confirmation_suggestions(),
                )))
            }
        }
    }

    // ---- Error recovery ----

    fn on_error(
        &self,
        ctx: &mut ConversationContext,
        analysis: CommandAnalysis,
    ) -> Result<TurnOutcome, ContextError> {
        match self.replies.recovery(&analysis.original_text) {
            RecoveryChoice::Retry => {
                transition(&mut ctx.active_context, SessionState::CollectingParameters)?;
                let (message, suggestions) = match ctx.active_context.next_required() {
                    Some(next) => (
                        prompts::parameter_prompt(next),
                        prompts::parameter_suggestions(next),
                    ),
                    None => (prompts::retrying(), prompts::retry_suggestions()),
                };
                Ok(TurnOutcome::Reply(reply(
                    message,
                    true,
                    SessionState::CollectingParameters,
                    suggestions,
                )))
            }
            RecoveryChoice::StartOver => {
                transition(&mut ctx.active_context, SessionState::Idle)?;
                ctx.active_context.reset_all();
                ctx.pending_operations.clear();
                Ok(TurnOutcome::Reply(reply(
                    prompts::started_over(),
                    true,
                    SessionState::Idle,
                    prompts::capability_suggestions(),
                )))
            }
            RecoveryChoice::Cancel => self.cancel(ctx, &analysis.original_text),
            RecoveryChoice::Unrecognized => {
                transition(&mut ctx.active_context, SessionState::Error)?;
                Ok(TurnOutcome::Reply(reply(
                    prompts::recovery_menu(),
                    true,
                    SessionState::Error,
                    prompts::recovery_suggestions(),
                )))
            }
        }
    }

    // ---- Execution ----

    /// Record the tool call and build the request. State must already be
    /// `Executing`.
    fn begin_execution(
        &self,
        ctx: &mut ConversationContext,
        user_input: &str,
    ) -> Result<ExecutionRequest, ContextError> {
        let tool_name = current_tool(ctx)?;
        let arguments = ctx.active_context.pending_parameters.clone();

        let mut entry = ContextEntry::new(EntryKind::ToolCall, user_input);
        entry.tool_name = Some(tool_name.clone());
        entry.parameters = arguments.clone();
        ctx.push_entry(entry);

        Ok(ExecutionRequest {
            tool_name,
            arguments,
            user_input: user_input.to_string(),
        })
    }

    /// Fold a tool outcome back into the session.
    ///
    /// If the context is no longer executing this request (it was cleared or
    /// reset meanwhile) the outcome is reported but the context is left alone.
    pub fn complete(
        &self,
        ctx: &mut ConversationContext,
        request: &ExecutionRequest,
        outcome: Result<ToolResult, ToolError>,
    ) -> Result<Completion, ContextError> {
        let still_running = ctx.session_state() == SessionState::Executing
            && ctx.active_context.current_tool.as_deref() == Some(request.tool_name.as_str());

        let outcome = match outcome {
            Ok(result) if result.success => Ok(result),
            Ok(result) => Err(result.message),
            Err(e) => Err(e.to_string()),
        };

        if !still_running {
            tracing::warn!(
                conversation_id = %ctx.conversation_id,
                tool = %request.tool_name,
                "Tool finished after the session moved on"
            );
            let state = ctx.session_state();
            return Ok(match outcome {
                Ok(result) => Completion {
                    response: reply(
                        prompts::completed(&request.tool_name, &result.message),
                        false,
                        state,
                        Vec::new(),
                    ),
                    failure: None,
                },
                Err(reason) => Completion {
                    response: reply(
                        prompts::failure(&request.tool_name, &reason),
                        false,
                        state,
                        Vec::new(),
                    ),
                    failure: Some(reason),
                },
            });
        }

        match outcome {
            Ok(result) => {
                transition(&mut ctx.active_context, SessionState::Idle)?;
                let message = prompts::completed(&request.tool_name, &result.message);

                let mut entry = ContextEntry::new(EntryKind::Completion, &request.user_input);
                entry.tool_name = Some(request.tool_name.clone());
                entry.parameters = request.arguments.clone();
                entry.tool_result = Some(result);
                entry.ai_response = Some(message.clone());
                ctx.push_entry(entry);

                remove_operation(ctx, &request.tool_name);
                ctx.active_context.reset_operation();

                Ok(Completion {
                    response: reply(
                        message,
                        false,
                        SessionState::Idle,
                        prompts::capability_suggestions(),
                    ),
                    failure: None,
                })
            }
            Err(reason) => {
                transition(&mut ctx.active_context, SessionState::Error)?;
                Ok(Completion {
                    response: reply(
                        prompts::failure(&request.tool_name, &reason),
                        true,
                        SessionState::Error,
                        prompts::recovery_suggestions(),
                    ),
                    failure: Some(reason),
                })
            }
        }
    }

    // ---- Cancellation ----

    fn cancel(
        &self,
        ctx: &mut ConversationContext,
        user_input: &str,
    ) -> Result<TurnOutcome, ContextError> {
        transition(&mut ctx.active_context, SessionState::Idle)?;
        if let Some(tool) = ctx.active_context.current_tool.clone() {
            remove_operation(ctx, &tool);
        }
        ctx.active_context.reset_operation();

        let message = prompts::cancelled();
        let mut entry = ContextEntry::new(EntryKind::UserResponse, user_input);
        entry.ai_response = Some(message.clone());
        ctx.push_entry(entry);

        Ok(TurnOutcome::Reply(reply(
            message,
            false,
            SessionState::Idle,
            prompts::capability_suggestions(),
        )))
    }
}

fn reply(
    message: String,
    needs_user_input: bool,
    session_state: SessionState,
    suggested_actions: Vec<String>,
) -> ContextualResponse {
    ContextualResponse {
        message,
        needs_user_input,
        session_state,
        suggested_actions,
    }
}

fn next_prompt(required: &[String]) -> String {
    required
        .first()
        .map(|name| prompts::parameter_prompt(name))
        .unwrap_or_else(prompts::nothing_missing)
}

fn current_tool(ctx: &ConversationContext) -> Result<String, ContextError> {
    ctx.active_context.current_tool.clone().ok_or_else(|| {
        ContextError::InvalidState(format!(
            "{} has no current tool in state {}",
            ctx.conversation_id,
            ctx.session_state()
        ))
    })
}

/// Drop the most recent queued operation for `tool_name`.
fn remove_operation(ctx: &mut ConversationContext, tool_name: &str) {
    if let Some(pos) = ctx
        .pending_operations
        .iter()
        .rposition(|op| op.tool_name == tool_name)
    {
        ctx.pending_operations.remove(pos);
    }
}
