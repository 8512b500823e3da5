//! Colloquy API crate - axum HTTP server and route handlers.
//!
//! Exposes the conversation context engine over REST: one endpoint per
//! turn, plus history, state, export/import and statistics queries.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
