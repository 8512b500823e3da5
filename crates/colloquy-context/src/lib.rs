//! Conversation context engine for Colloquy.
//!
//! Tracks per-conversation state across turns, extracts tool parameters from
//! natural language, walks users through multi-turn parameter collection and
//! hands complete requests to a pluggable tool executor.

pub mod cleanup;
pub mod enricher;
pub mod error;
pub mod executor;
pub mod intent;
pub mod manager;
pub mod session;
pub mod store;
pub mod types;

pub use cleanup::{CleanupHandle, CleanupScheduler};
pub use enricher::ContextEnricher;
pub use error::{ContextError, ToolError};
pub use executor::{DryRunExecutor, HistoryProvider, InMemoryHistory, ToolExecutor};
pub use intent::{
    CommandAnalyzer, MultiTurnPattern, ParameterResolver, PatternRegistry, ToolCatalog,
    ToolDefinition,
};
pub use manager::ContextManager;
pub use session::{Completion, ExecutionRequest, SessionMachine, TurnOutcome};
pub use store::ContextStore;
pub use types::{
    ActiveContext, CommandAnalysis, ContextEntry, ContextStats, ContextualResponse,
    ConversationContext, EntryKind, HistoryMessage, IntentCategory, MultiTurnIntent,
    MultiTurnStep, ParamValue, Parameters, PendingOperation, Priority, SessionState, ToolResult,
};
