//! User-facing wording: parameter prompts, summaries and reply matching.
//!
//! Composes every sentence the session loop says back to the user, and
//! classifies short replies (confirmations, cancellations, recovery choices)
//! by case-insensitive keyword containment.

use regex::Regex;

use crate::intent::resolver::{CONTENT_PARAM, FORMAT_PARAM, RECIPIENTS_PARAM};
use crate::types::Parameters;

/// Formats offered when asking for an output format.
pub const FORMAT_SUGGESTIONS: [&str; 4] = ["PDF", "Word document", "HTML", "Plain text"];

// =============================================================================
// Prompts
// =============================================================================

/// Question asking the user for one parameter.
pub fn parameter_prompt(name: &str) -> String {
    match name {
        CONTENT_PARAM => "What would you like the document to be about?".to_string(),
        FORMAT_PARAM => {
            "What format would you like? PDF, Word document, HTML or plain text?".to_string()
        }
        RECIPIENTS_PARAM => "Who should I send it to? Please give an email address.".to_string(),
        "body" => "What should the message say?".to_string(),
        "title" => "What should I call the event?".to_string(),
        "time" => "When should it happen?".to_string(),
        "query" => "What would you like me to search for?".to_string(),
        other => format!("Please provide the {}.", other.replace('_', " ")),
    }
}

/// Suggested quick replies while waiting for one parameter.
pub fn parameter_suggestions(name: &str) -> Vec<String> {
    match name {
        FORMAT_PARAM => FORMAT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        _ => vec!["cancel".to_string()],
    }
}

/// Short verb phrase describing what a tool does.
pub fn tool_label(tool_name: &str) -> String {
    match tool_name {
        "generate_document" => "generate the document".to_string(),
        "send_email" => "send the email".to_string(),
        "create_calendar_event" => "create the calendar event".to_string(),
        "web_search" => "run the web search".to_string(),
        other => format!("run {}", other.replace('_', " ")),
    }
}

/// Summary read back before execution.
pub fn confirmation_summary(tool_name: &str, params: &Parameters) -> String {
    let details: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}: {}", name.replace('_', " "), value))
        .collect();
    if details.is_empty() {
        format!("Ready to {}. Shall I go ahead?", tool_label(tool_name))
    } else {
        format!(
            "Ready to {} with {}. Shall I go ahead?",
            tool_label(tool_name),
            details.join("; ")
        )
    }
}

pub fn confirmation_suggestions() -> Vec<String> {
    vec!["yes".to_string(), "no".to_string()]
}

pub fn not_understood() -> String {
    "I'm not sure what you'd like me to do. I can generate documents, send emails, \
     schedule events or search the web."
        .to_string()
}

pub fn capability_suggestions() -> Vec<String> {
    vec![
        "Generate a document".to_string(),
        "Send an email".to_string(),
        "Schedule a meeting".to_string(),
        "Search the web".to_string(),
    ]
}

pub fn cancelled() -> String {
    "Okay, I've cancelled that.".to_string()
}

pub fn busy() -> String {
    "I'm still working on your previous request. Please wait a moment.".to_string()
}

pub fn completed(tool_name: &str, tool_message: &str) -> String {
    if tool_message.trim().is_empty() {
        format!("Done! I was able to {}.", tool_label(tool_name))
    } else {
        format!("Done! {}", tool_message.trim())
    }
}

pub fn failure(tool_name: &str, reason: &str) -> String {
    format!(
        "Sorry, I couldn't {}: {}. Would you like to try again, start over, or cancel?",
        tool_label(tool_name),
        reason
    )
}

pub fn recovery_menu() -> String {
    "Something went wrong with the last request. Would you like to try again, start over, \
     or cancel?"
        .to_string()
}

pub fn recovery_suggestions() -> Vec<String> {
    vec![
        "try again".to_string(),
        "start over".to_string(),
        "cancel".to_string(),
    ]
}

pub fn retrying() -> String {
    "Okay, let's try that again. Tell me anything you'd like to change, or say continue."
        .to_string()
}

/// Asked when a retried request already has every parameter.
pub fn nothing_missing() -> String {
    "Anything else to add before I go ahead?".to_string()
}

pub fn retry_suggestions() -> Vec<String> {
    vec!["continue".to_string(), "cancel".to_string()]
}

pub fn started_over() -> String {
    "Alright, starting fresh. What would you like to do?".to_string()
}

// =============================================================================
// Reply classification
// =============================================================================

/// How the user answered a yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Confirm,
    Cancel,
    /// Neither or both kinds of keyword matched.
    Ambiguous,
}

/// The user's pick from the error recovery menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Retry,
    StartOver,
    Cancel,
    Unrecognized,
}

/// Words that confirm a pending operation.
pub const CONFIRM_WORDS: [&str; 7] = [
    "yes", "okay", "ok", "sure", "proceed", "go ahead", "do it",
];

/// Words that decline a pending operation.
pub const CANCEL_WORDS: [&str; 5] = ["no", "cancel", "stop", "don't", "abort"];

const RETRY_WORDS: [&str; 2] = ["try again", "retry"];
const START_OVER_WORDS: [&str; 2] = ["start over", "reset"];
const ABANDON_WORDS: [&str; 1] = ["cancel"];

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

/// Keyword matcher for short replies.
///
/// Yes/no and recovery replies match when a keyword occurs anywhere in the
/// lowercased utterance, so "yesss" confirms and "nah, not now" declines.
pub struct ReplyClassifier {
    cancel_only: Regex,
}

impl Default for ReplyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyClassifier {
    pub fn new() -> Self {
        Self {
            cancel_only: Regex::new(
                r"(?i)^\s*(?:cancel|stop|abort|never\s*mind)(?:\s+(?:it|that|this))?\s*[.!]*\s*$",
            )
            .expect("Invalid cancel regex"),
        }
    }

    /// Classify an answer to "Shall I go ahead?".
    ///
    /// Confirm and cancel words are checked independently; a reply carrying
    /// both is ambiguous.
    pub fn confirmation(&self, text: &str) -> ConfirmationReply {
        let text = text.to_lowercase();
        match (
            contains_any(&text, &CONFIRM_WORDS),
            contains_any(&text, &CANCEL_WORDS),
        ) {
            (true, false) => ConfirmationReply::Confirm,
            (false, true) => ConfirmationReply::Cancel,
            _ => ConfirmationReply::Ambiguous,
        }
    }

    /// Whether the utterance is nothing but a request to abandon the flow.
    pub fn is_cancel_phrase(&self, text: &str) -> bool {
        self.cancel_only.is_match(text)
    }

    /// Classify a reply to the error recovery menu.
    pub fn recovery(&self, text: &str) -> RecoveryChoice {
        let text = text.to_lowercase();
        if contains_any(&text, &RETRY_WORDS) {
            RecoveryChoice::Retry
        } else if contains_any(&text, &START_OVER_WORDS) {
            RecoveryChoice::StartOver
        } else if contains_any(&text, &ABANDON_WORDS) {
            RecoveryChoice::Cancel
        } else {
            RecoveryChoice::Unrecognized
        }
    }
}
