//! Command analyzer.
//!
//! Classifies an utterance into an intent and tool, runs the parameter
//! resolver, overlays parameters already pending in the conversation and
//! works out which required parameters are still missing.

use regex::Regex;

use crate::error::ContextError;
use crate::types::{ActiveContext, CommandAnalysis, IntentCategory, ParamValue};

use super::catalog::ToolCatalog;
use super::resolver::{ParameterResolver, CONTENT_PARAM, FORMAT_PARAM, RECIPIENTS_PARAM};

/// Confidence reported when no intent could be classified.
const UNKNOWN_CONFIDENCE: f32 = 0.1;
/// Confidence reported when a tool declares no parameters at all.
const NEUTRAL_CONFIDENCE: f32 = 0.5;
const BASE_CONFIDENCE: f32 = 0.3;
const COVERAGE_WEIGHT: f32 = 0.6;
const MAX_CONFIDENCE: f32 = 0.9;

/// A keyword rule linked to an intent category.
struct IntentRule {
    regex: Regex,
    intent: IntentCategory,
}

/// Classifies utterances and tracks parameter coverage.
pub struct CommandAnalyzer {
    rules: Vec<IntentRule>,
    resolver: ParameterResolver,
    catalog: ToolCatalog,
}

impl Default for CommandAnalyzer {
    fn default() -> Self {
        Self::new(ToolCatalog::builtin())
    }
}

impl CommandAnalyzer {
    /// Create an analyzer over the given tool catalog.
    ///
    /// Rules are checked in order and the first match wins.
    pub fn new(catalog: ToolCatalog) -> Self {
        let rule_table: Vec<(&str, IntentCategory)> = vec![
            (
                r"(?i)\b(?:email|e-mail|mail)\b|\bsend\b.*@",
                IntentCategory::EmailComposition,
            ),
            (
                r"(?i)\b(?:schedule|meeting|calendar|appointment|event)\b",
                IntentCategory::CalendarScheduling,
            ),
            (
                r"(?i)\b(?:search|look\s+up|google)\b",
                IntentCategory::WebSearch,
            ),
            (
                r"(?i)\b(?:generate|document|doc|docx|report|pdf|write\s+up)\b",
                IntentCategory::DocumentGeneration,
            ),
        ];

        let rules = rule_table
            .into_iter()
            .map(|(pat, intent)| IntentRule {
                regex: Regex::new(pat).expect("Invalid intent regex"),
                intent,
            })
            .collect();

        Self {
            rules,
            resolver: ParameterResolver::new(),
            catalog,
        }
    }

    pub fn resolver(&self) -> &ParameterResolver {
        &self.resolver
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Classify free text into an intent category by keyword rules.
    pub fn classify(&self, text: &str) -> IntentCategory {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| rule.intent)
            .unwrap_or(IntentCategory::Unknown)
    }

    /// Analyze an utterance against the conversation's active context.
    pub fn analyze(
        &self,
        text: &str,
        active: &ActiveContext,
    ) -> Result<CommandAnalysis, ContextError> {
        let mut provided = self.resolver.resolve(text)?;

        // An operation in flight keeps its tool; otherwise classify afresh.
        let (intent, tool_name) = match &active.current_tool {
            Some(current) => {
                let intent = self
                    .catalog
                    .by_name(current)
                    .map(|t| t.intent)
                    .unwrap_or(IntentCategory::Unknown);
                (intent, Some(current.clone()))
            }
            None => {
                let intent = self.classify(text);
                let tool = self.catalog.by_intent(intent).map(|t| t.name.clone());
                (intent, tool)
            }
        };

        let tool = tool_name.as_deref().and_then(|n| self.catalog.by_name(n));

        if let Some(tool) = tool {
            if tool.content_param != CONTENT_PARAM {
                if let Some(content) = provided.remove(CONTENT_PARAM) {
                    provided.entry(tool.content_param.clone()).or_insert(content);
                }
            }
        }

        for (key, value) in &active.pending_parameters {
            provided
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let missing_parameters: Vec<String> = tool
            .map(|t| {
                t.required
                    .iter()
                    .filter(|name| !provided.contains_key(*name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let confidence = confidence(intent, provided.len(), missing_parameters.len());

        Ok(CommandAnalysis {
            original_text: text.to_string(),
            intent,
            tool_name,
            provided_parameters: provided,
            missing_parameters,
            confidence,
            priority: self.resolver.priority(text),
        })
    }
}

/// Treat the whole utterance as the answer to the parameter just asked for.
///
/// Only applies to free-text parameters: a format or a recipient list
/// must come from the resolver or not at all.
pub fn fill_expected(analysis: &mut CommandAnalysis, expected: &str) -> bool {
    if expected == FORMAT_PARAM || expected == RECIPIENTS_PARAM {
        return false;
    }
    if analysis.provided_parameters.contains_key(expected) {
        return false;
    }
    let answer = analysis.original_text.trim();
    if answer.is_empty() {
        return false;
    }
    analysis
        .provided_parameters
        .insert(expected.to_string(), ParamValue::from(answer));
    analysis.missing_parameters.retain(|name| name != expected);
    true
}

/// Confidence from how much of the tool's input is already known.
pub fn confidence(intent: IntentCategory, provided: usize, missing: usize) -> f32 {
    if intent == IntentCategory::Unknown {
        return UNKNOWN_CONFIDENCE;
    }
    let total = provided + missing;
    if total == 0 {
        return NEUTRAL_CONFIDENCE;
    }
    let coverage = provided as f32 / total as f32;
    (BASE_CONFIDENCE + COVERAGE_WEIGHT * coverage).min(MAX_CONFIDENCE)
}
