//! Heuristic parameter extraction from raw utterances.
//!
//! Best-effort and order-sensitive: the first matching format rule wins,
//! recipients are every email-looking token, and content is whatever
//! follows the first command verb once filler words are peeled off. This is
//! not a parser and callers must treat its output as hints.

use regex::Regex;

use crate::error::ContextError;
use crate::types::{ParamValue, Parameters, Priority};

/// Parameter carrying the output format.
pub const FORMAT_PARAM: &str = "format";
/// Parameter carrying recipient addresses.
pub const RECIPIENTS_PARAM: &str = "to";
/// Parameter carrying residual free text.
pub const CONTENT_PARAM: &str = "content";

/// Words peeled off the front of the residual content.
const LEADING_FILLER: &[&str] = &[
    "a", "an", "the", "new", "me", "my", "up", "some", "pdf", "word", "docx", "html", "txt",
    "document", "documents", "doc", "file", "email", "e-mail", "mail", "message", "meeting",
    "event", "appointment", "calendar", "invite", "about", "on", "for", "regarding", "to",
    "with", "titled", "called",
];

/// Stateless extractor with its regexes compiled once.
pub struct ParameterResolver {
    format_rules: Vec<(Regex, &'static str)>,
    email: Regex,
    command_verb: Regex,
    trailing_format: Regex,
    high_priority: Regex,
    low_priority: Regex,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterResolver {
    pub fn new() -> Self {
        let format_rules = vec![
            (r"(?i)\bpdf\b", "pdf"),
            (r"(?i)\b(?:word|docx)\b", "docx"),
            (r"(?i)\bhtml\b", "html"),
            (r"(?i)\b(?:plain\s+text|txt)\b", "txt"),
        ]
        .into_iter()
        .map(|(pat, value)| (Regex::new(pat).expect("Invalid format regex"), value))
        .collect();

        Self {
            format_rules,
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("Invalid email regex"),
            command_verb: Regex::new(r"(?i)\b(?:generate|create|send|schedule|search)\b(.*)$")
                .expect("Invalid verb regex"),
            trailing_format: Regex::new(
                r"(?i)\s+(?:in|as)\s+(?:a\s+)?(?:pdf|word|docx|html|plain\s+text|txt)(?:\s+(?:format|file|document))?\s*[.!?]?\s*$",
            )
            .expect("Invalid trailing format regex"),
            high_priority: Regex::new(r"(?i)\b(?:urgent|urgently|asap|immediately)\b")
                .expect("Invalid priority regex"),
            low_priority: Regex::new(r"(?i)\b(?:no\s+rush|whenever|low\s+priority)\b")
                .expect("Invalid priority regex"),
        }
    }

    /// Extract every recognizable parameter from `text`.
    ///
    /// Returns `ParameterExtractionFailed` for blank input; otherwise an
    /// empty map simply means nothing was recognized.
    pub fn resolve(&self, text: &str) -> Result<Parameters, ContextError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::ParameterExtractionFailed(
                "input is empty".to_string(),
            ));
        }

        let mut params = Parameters::new();

        if let Some(format) = self.detect_format(text) {
            params.insert(FORMAT_PARAM.to_string(), ParamValue::from(format));
        }

        let recipients = self.extract_recipients(text);
        if !recipients.is_empty() {
            params.insert(RECIPIENTS_PARAM.to_string(), ParamValue::from(recipients));
        }

        if let Some(content) = self.extract_content(text) {
            params.insert(CONTENT_PARAM.to_string(), ParamValue::Text(content));
        }

        Ok(params)
    }

    /// First matching format keyword, normalized.
    pub fn detect_format(&self, text: &str) -> Option<&'static str> {
        self.format_rules
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, value)| *value)
    }

    /// All email addresses in order of appearance.
    pub fn extract_recipients(&self, text: &str) -> Vec<String> {
        self.email
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Text following the first command verb, minus filler.
    pub fn extract_content(&self, text: &str) -> Option<String> {
        let captures = self.command_verb.captures(text)?;
        let residual = captures.get(1)?.as_str();

        let residual = self.email.replace_all(residual, " ");
        let residual = self.trailing_format.replace(&residual, "");
        let mut words: Vec<&str> = residual.split_whitespace().collect();

        while let Some(first) = words.first() {
            let bare = first
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                .to_lowercase();
            if bare.is_empty() || LEADING_FILLER.contains(&bare.as_str()) {
                words.remove(0);
            } else {
                break;
            }
        }

        let content = words
            .join(" ")
            .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?')
            .to_string();
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    /// Urgency hint used when queuing an operation.
    pub fn priority(&self, text: &str) -> Priority {
        if self.high_priority.is_match(text) {
            Priority::High
        } else if self.low_priority.is_match(text) {
            Priority::Low
        } else {
            Priority::Normal
        }
    }
}
