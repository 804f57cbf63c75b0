//! Keyword-driven competitor battlecards.
//!
//! A single regex pass over each transcript window, so competitor mentions
//! reach the UI immediately without waiting on any model call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static COMPETITOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Word boundaries so "sales" alone does not match "salesforce".
    Regex::new(r"(?i)\b(salesforce|hubspot|gong|chorus|outreach)\b").expect("valid regex")
});

static CARDS: Lazy<Vec<(&'static str, Value)>> = Lazy::new(|| {
    vec![
        (
            "salesforce",
            json!({
                "competitor": "Salesforce",
                "talking_points": [
                    "Our onboarding is 3x faster -- no 6-month implementation cycle",
                    "We include AI coaching at no extra cost; Salesforce Einstein is a paid add-on",
                    "Our per-seat pricing is 40% lower at comparable tiers",
                    "Real-time call analytics vs. Salesforce's batch reporting",
                ],
                "weaknesses": [
                    "Complex admin overhead -- average customer needs a dedicated Salesforce admin",
                    "Einstein AI accuracy criticized in Gartner peer reviews (2024)",
                ],
                "counter_objections": {
                    "ecosystem": "We integrate with 50+ tools via native webhooks; no AppExchange lock-in",
                    "market_leader": "Market share does not equal best fit -- ask about their churn rate",
                },
            }),
        ),
        (
            "hubspot",
            json!({
                "competitor": "HubSpot",
                "talking_points": [
                    "HubSpot's free tier lacks call recording and analytics",
                    "Our AI coaching works in real-time during the call, not post-call",
                    "HubSpot Sales Hub Enterprise is $150/seat/mo vs. our $89/seat/mo",
                ],
                "weaknesses": [
                    "Limited customization on workflows without Operations Hub",
                    "Call transcription is post-call only with no word-level timestamps",
                ],
                "counter_objections": {
                    "all_in_one": "Bundling CRM + marketing inflates cost; best-of-breed is more flexible",
                },
            }),
        ),
        (
            "gong",
            json!({
                "competitor": "Gong",
                "talking_points": [
                    "Gong is $100+/seat/mo with annual contracts; we offer monthly billing",
                    "Our processing is 100% local -- no audio leaves your network",
                    "Real-time coaching during the call vs. Gong's post-call analysis",
                ],
                "weaknesses": [
                    "Gong requires uploading all call recordings to their cloud",
                    "Privacy concerns -- GDPR compliance requires additional configuration",
                ],
                "counter_objections": {
                    "proven": "We offer a free pilot with ROI measurement built in",
                },
            }),
        ),
        (
            "chorus",
            json!({
                "competitor": "Chorus (ZoomInfo)",
                "talking_points": [
                    "Chorus was acquired by ZoomInfo -- product direction is uncertain",
                    "Our standalone focus means faster feature iteration",
                    "No bundling tax -- you pay only for what you use",
                ],
                "weaknesses": [
                    "Integration depth with ZoomInfo data is limited post-acquisition",
                ],
                "counter_objections": {},
            }),
        ),
        (
            "outreach",
            json!({
                "competitor": "Outreach",
                "talking_points": [
                    "Outreach focuses on sequencing; we focus on live call intelligence",
                    "Complementary, not competitive -- but our analytics replace their call features",
                ],
                "weaknesses": [
                    "Call analytics is a secondary feature, not their core product",
                ],
                "counter_objections": {},
            }),
        ),
    ]
});

/// Returns the battlecard for the first competitor mentioned in `text`,
/// or `None` when no competitor keyword appears.
pub fn scan(text: &str) -> Option<Value> {
    let hit = COMPETITOR_PATTERN.find(text)?;
    let key = hit.as_str().to_lowercase();
    CARDS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, card)| card.clone())
}
