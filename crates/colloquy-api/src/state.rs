//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use colloquy_context::ContextManager;
use colloquy_core::config::ApiConfig;

/// Shared application state, passed to handlers via axum's `State`
/// extractor. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The conversation context engine.
    pub manager: Arc<ContextManager>,
    /// HTTP settings (bind address, body limit).
    pub api: ApiConfig,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manager: Arc<ContextManager>, api: ApiConfig) -> Self {
        Self {
            manager,
            api,
            start_time: Instant::now(),
        }
    }
}
