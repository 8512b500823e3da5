//! Multi-turn pattern registry.
//!
//! Maps an intent to the ordered steps used to walk a user through it. The
//! registry only seeds a conversation's `MultiTurnIntent` and supplies the
//! opening prompt; later turns are driven by the missing-parameter loop.

use colloquy_core::config::PatternConfig;

use crate::error::ContextError;
use crate::types::{IntentCategory, MultiTurnIntent, MultiTurnStep, Parameters};

/// A registered multi-turn pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTurnPattern {
    pub intent: IntentCategory,
    pub steps: Vec<MultiTurnStep>,
}

impl MultiTurnPattern {
    pub fn new(intent: IntentCategory, steps: &[(&str, &str)]) -> Self {
        Self {
            intent,
            steps: steps
                .iter()
                .map(|(name, prompt)| MultiTurnStep {
                    name: name.to_string(),
                    prompt: prompt.to_string(),
                })
                .collect(),
        }
    }

    /// Prompt of the opening step.
    pub fn first_prompt(&self) -> Option<&str> {
        self.steps.first().map(|s| s.prompt.as_str())
    }

    /// Fresh progress record positioned at step 0.
    pub fn seed(&self, collected: &Parameters) -> MultiTurnIntent {
        MultiTurnIntent {
            intent: self.intent,
            current_step: 0,
            total_steps: self.steps.len(),
            steps: self.steps.clone(),
            collected_data: collected.clone(),
            next_expected_input: self.steps.first().map(|s| s.name.clone()),
        }
    }
}

/// Lookup table of multi-turn patterns, supplied at construction.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<MultiTurnPattern>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternRegistry {
    pub fn new(patterns: Vec<MultiTurnPattern>) -> Self {
        Self { patterns }
    }

    /// Document, email and calendar flows. Web search is single-shot.
    pub fn builtin() -> Self {
        Self::new(vec![
            MultiTurnPattern::new(
                IntentCategory::DocumentGeneration,
                &[
                    (
                        "content_type",
                        "What kind of document would you like me to create, and what should it cover?",
                    ),
                    (
                        "format",
                        "What format would you like? PDF, Word document, HTML or plain text?",
                    ),
                    ("details", "Any extra details to include?"),
                    ("confirmation", "Shall I go ahead and generate it?"),
                ],
            ),
            MultiTurnPattern::new(
                IntentCategory::EmailComposition,
                &[
                    ("recipients", "Who should I send the email to?"),
                    ("body", "What should the email say?"),
                    ("confirmation", "Shall I send it?"),
                ],
            ),
            MultiTurnPattern::new(
                IntentCategory::CalendarScheduling,
                &[
                    ("title", "What is the event about?"),
                    ("time", "When should I schedule it?"),
                    ("confirmation", "Shall I add it to your calendar?"),
                ],
            ),
        ])
    }

    /// Build a registry from config entries, or the built-ins when empty.
    pub fn from_config(configs: &[PatternConfig]) -> Result<Self, ContextError> {
        if configs.is_empty() {
            return Ok(Self::builtin());
        }
        let mut patterns = Vec::with_capacity(configs.len());
        for config in configs {
            let intent: IntentCategory = config
                .intent
                .parse()
                .map_err(ContextError::InvalidState)?;
            if config.steps.is_empty() {
                return Err(ContextError::InvalidState(format!(
                    "pattern {} has no steps",
                    config.intent
                )));
            }
            patterns.push(MultiTurnPattern {
                intent,
                steps: config
                    .steps
                    .iter()
                    .map(|s| MultiTurnStep {
                        name: s.name.clone(),
                        prompt: s.prompt.clone(),
                    })
                    .collect(),
            });
        }
        Ok(Self::new(patterns))
    }

    pub fn get(&self, intent: IntentCategory) -> Option<&MultiTurnPattern> {
        self.patterns.iter().find(|p| p.intent == intent)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
