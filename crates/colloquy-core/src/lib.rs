//! Shared configuration and error types for the Colloquy workspace.

pub mod config;
pub mod error;

pub use config::ColloquyConfig;
pub use error::{ColloquyError, Result};
