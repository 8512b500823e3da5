//! Context enrichment from conversation history.
//!
//! Derives soft preference signals (frequent topics, preferred provider and
//! format, typical latency, most used tool) that are stored in a context's
//! `contextual_information`. Signals never drive state transitions.

use std::collections::HashMap;

use crate::intent::resolver::ParameterResolver;
use crate::types::{ContextEntry, EntryKind, HistoryMessage, ParamValue, Parameters};

pub const FREQUENT_TOPICS: &str = "frequent_topics";
pub const PREFERRED_PROVIDER: &str = "preferred_provider";
pub const AVERAGE_PROCESSING_TIME: &str = "average_processing_time_ms";
pub const PREFERRED_FORMAT: &str = "preferred_format";
pub const FREQUENT_TOOL: &str = "frequent_tool";

/// Upper bound on the history window, whatever the configuration says.
pub const MAX_WINDOW: usize = 10;
const TOPIC_COUNT: usize = 5;
const MIN_TOPIC_LEN: usize = 4;

const STOP_WORDS: &[&str] = &[
    "about", "also", "been", "could", "from", "have", "just", "like", "make", "please", "should",
    "that", "them", "then", "there", "these", "they", "this", "what", "when", "will", "with",
    "would", "your",
];

/// Computes enrichment signals from recent messages.
pub struct ContextEnricher {
    window: usize,
    resolver: ParameterResolver,
}

impl ContextEnricher {
    /// Create an enricher over the last `window` messages (capped at 10).
    pub fn new(window: usize) -> Self {
        Self {
            window: window.clamp(1, MAX_WINDOW),
            resolver: ParameterResolver::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Derive every available signal. Signals with no evidence are omitted.
    pub fn compute(&self, messages: &[HistoryMessage], history: &[ContextEntry]) -> Parameters {
        let recent = &messages[messages.len().saturating_sub(self.window)..];
        let mut signals = Parameters::new();

        let topics = frequent_topics(recent);
        if !topics.is_empty() {
            signals.insert(FREQUENT_TOPICS.to_string(), ParamValue::from(topics));
        }

        if let Some(provider) = most_common(recent.iter().filter_map(|m| m.ai_provider.as_deref()))
        {
            signals.insert(PREFERRED_PROVIDER.to_string(), ParamValue::from(provider));
        }

        let times: Vec<f64> = recent.iter().filter_map(|m| m.processing_time_ms).collect();
        if !times.is_empty() {
            let mean = times.iter().sum::<f64>() / times.len() as f64;
            signals.insert(AVERAGE_PROCESSING_TIME.to_string(), ParamValue::Number(mean));
        }

        let formats = recent
            .iter()
            .filter(|m| m.role == "user")
            .filter_map(|m| self.resolver.detect_format(&m.content));
        if let Some(format) = most_common(formats) {
            signals.insert(PREFERRED_FORMAT.to_string(), ParamValue::from(format));
        }

        let tools = history
            .iter()
            .filter(|e| e.kind == EntryKind::Completion)
            .filter_map(|e| e.tool_name.as_deref());
        if let Some(tool) = most_common(tools) {
            signals.insert(FREQUENT_TOOL.to_string(), ParamValue::from(tool));
        }

        signals
    }
}

/// Top lowercase words longer than three characters, ties alphabetical.
fn frequent_topics(messages: &[HistoryMessage]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for message in messages {
        for word in message
            .content
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= MIN_TOPIC_LEN)
        {
            let word = word.to_lowercase();
            if STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(TOPIC_COUNT).map(|(w, _)| w).collect()
}

/// Most frequent item; ties go to the alphabetically first.
fn most_common<'a>(items: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(item, _)| item.to_string())
}
