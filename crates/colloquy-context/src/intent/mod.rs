//! Understanding utterances: intent classification and parameter extraction.

pub mod analyzer;
pub mod catalog;
pub mod patterns;
pub mod resolver;

pub use analyzer::{confidence, fill_expected, CommandAnalyzer};
pub use catalog::{ToolCatalog, ToolDefinition};
pub use patterns::{MultiTurnPattern, PatternRegistry};
pub use resolver::ParameterResolver;
