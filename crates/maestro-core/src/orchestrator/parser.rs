//! Defensive parsing of LLM completions.
//!
//! Models are told to respond with a raw JSON object, but in practice the
//! payload arrives bare, fenced in markdown, wrapped in prose, or with
//! trailing commas. Each salvage stage runs only when the previous one fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::shared::ActionDraft;

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

/// Extracts the JSON object from a completion, tolerating markdown fences,
/// surrounding prose, and trailing commas. Returns `None` when no stage
/// yields valid JSON.
pub fn salvage_json(raw: &str) -> Option<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    if let Some(block) = JSON_BLOCK.find(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block.as_str()) {
            return Some(value);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            let span = &text[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(span) {
                return Some(value);
            }
            let repaired = TRAILING_COMMA.replace_all(span, "$1");
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                return Some(value);
            }
        }
    }

    let snippet: String = text.chars().take(120).collect();
    debug!(target: "maestro::engine", "no JSON object in completion: {snippet}");
    None
}

/// Parses a consultation completion into an action draft. Unknown action
/// types fail the typed conversion and the draft is dropped.
pub fn parse_action_draft(raw: &str) -> Option<ActionDraft> {
    let value = salvage_json(raw)?;
    match serde_json::from_value::<ActionDraft>(value) {
        Ok(draft) => Some(draft),
        Err(err) => {
            debug!(target: "maestro::engine", "completion JSON is not an action: {err}");
            None
        }
    }
}
