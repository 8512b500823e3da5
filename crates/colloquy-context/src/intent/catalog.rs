//! Tool catalog: which tool serves which intent and what it needs.

use crate::types::IntentCategory;

/// Declaration of one external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub intent: IntentCategory,
    /// Required parameters, in the order the user is asked for them.
    pub required: Vec<String>,
    /// Parameter that receives residual free-text content.
    pub content_param: String,
}

impl ToolDefinition {
    pub fn new(name: &str, intent: IntentCategory, required: &[&str], content_param: &str) -> Self {
        Self {
            name: name.to_string(),
            intent,
            required: required.iter().map(|s| s.to_string()).collect(),
            content_param: content_param.to_string(),
        }
    }
}

/// Lookup table of tool definitions, injected into the analyzer.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        Self { tools }
    }

    /// The four tools the assistant ships with.
    pub fn builtin() -> Self {
        Self::new(vec![
            ToolDefinition::new(
                "generate_document",
                IntentCategory::DocumentGeneration,
                &["content", "format"],
                "content",
            ),
            ToolDefinition::new(
                "send_email",
                IntentCategory::EmailComposition,
                &["to", "body"],
                "body",
            ),
            ToolDefinition::new(
                "create_calendar_event",
                IntentCategory::CalendarScheduling,
                &["title", "time"],
                "title",
            ),
            ToolDefinition::new("web_search", IntentCategory::WebSearch, &["query"], "query"),
        ])
    }

    pub fn by_name(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn by_intent(&self, intent: IntentCategory) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.intent == intent)
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }
}
