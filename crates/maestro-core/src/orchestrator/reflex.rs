//! Instant reflex rules.
//!
//! Checked on every accepted perception before any LLM consultation. The
//! first rule that fires wins and suppresses consultation for that window.

use crate::shared::{ActionDraft, ActionType, Perception, Priority};

/// Phrases that read as imminent churn.
const CHURN_KEYWORDS: &[&str] = &[
    "cancel",
    "cancelling",
    "leaving",
    "switch",
    "competitor",
    "done with",
    "terrible",
    "worst",
    "never again",
];

/// Phrases that read as a price objection.
const PRICE_KEYWORDS: &[&str] = &[
    "expensive",
    "too much",
    "cheaper",
    "discount",
    "price",
    "cost",
];

/// Softer friction phrases. These never fire a reflex on their own; they
/// qualify the window for an LLM consultation instead.
const CONSULT_TRIGGERS: &[&str] = &[
    "not happy",
    "disappointed",
    "frustrated",
    "wait",
    "waited",
    "refund",
    "broken",
    "doesn't work",
    "problem",
    "issue",
    "explain",
    "understand",
    "why",
    "how long",
];

/// A window is critical when its own reading spikes and the smoothed session
/// risk is already elevated. Both legs must hold: a single hot window on an
/// otherwise calm call stays below the alert bar.
pub fn is_critical_risk(perception: &Perception, session_risk: f64) -> bool {
    let emotion = &perception.emotion;
    let window_hot = emotion.risk_level > 0.85
        || (emotion.label == crate::shared::EmotionLabel::Angry && emotion.score > 0.85);
    window_hot && session_risk > 0.75
}

pub fn mentions_churn(text: &str) -> bool {
    CHURN_KEYWORDS.iter().any(|kw| text.contains(kw))
}

pub fn mentions_price(text: &str) -> bool {
    PRICE_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// True when the window should nudge the consultation gate open.
pub fn mentions_consult_trigger(transcript: &str) -> bool {
    let text = transcript.to_lowercase();
    CONSULT_TRIGGERS.iter().any(|kw| text.contains(kw))
}

/// Runs the reflex rules in fixed order against one perception.
/// `session_risk` is the smoothed score after this window was folded in.
pub fn evaluate(perception: &Perception, session_risk: f64) -> Option<ActionDraft> {
    let text = perception.transcript.to_lowercase();

    if is_critical_risk(perception, session_risk) {
        return Some(ActionDraft {
            action_type: ActionType::ShowRiskAlert,
            priority: Priority::Critical,
            headline: "Critical: Customer extremely upset. Consider escalating.".to_string(),
            suggestion: "Say: 'I want to make sure we resolve this fully for you. Let me get a specialist involved.'".to_string(),
            ..Default::default()
        });
    }

    if mentions_churn(&text) {
        return Some(ActionDraft {
            action_type: ActionType::ShowRiskAlert,
            priority: Priority::High,
            headline: "Churn risk detected".to_string(),
            suggestion: "Try: 'I completely understand. Before you go, can I see what I can do for you personally?'".to_string(),
            ..Default::default()
        });
    }

    if mentions_price(&text) {
        return Some(ActionDraft {
            action_type: ActionType::ShowPrompt,
            priority: Priority::Medium,
            headline: "Price Objection Detected".to_string(),
            suggestion: "Focus on value not price. Ask: 'What's most important to you in solving this problem?'".to_string(),
            category: Some("objection_handling".to_string()),
            ..Default::default()
        });
    }

    None
}
