//! Shared types used across the MAESTRO crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// -----------------------------------------------------------------------------
// Emotion scoring
// -----------------------------------------------------------------------------

/// Emotion classes emitted by the perception layer. Wire values are snake_case;
/// the short aliases cover audio-classification backends that emit 3-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    #[serde(alias = "ang")]
    Angry,
    #[serde(alias = "disgust")]
    Disgusted,
    #[serde(alias = "fear")]
    Fearful,
    Sad,
    #[serde(alias = "surprise")]
    Surprised,
    #[serde(alias = "hap")]
    Happy,
    #[serde(alias = "neu")]
    Neutral,
}

impl EmotionLabel {
    /// Baseline call-risk contribution of this emotion, used when a backend
    /// reports a label without per-class scores.
    pub fn base_risk(&self) -> f64 {
        match self {
            Self::Angry => 0.9,
            Self::Disgusted => 0.8,
            Self::Fearful => 0.7,
            Self::Sad => 0.6,
            Self::Surprised => 0.3,
            Self::Happy => 0.1,
            Self::Neutral => 0.2,
        }
    }

    /// True for the classes that count toward the summed risk level.
    #[inline]
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Angry | Self::Disgusted | Self::Fearful | Self::Sad)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Angry => "angry",
            Self::Disgusted => "disgusted",
            Self::Fearful => "fearful",
            Self::Sad => "sad",
            Self::Surprised => "surprised",
            Self::Happy => "happy",
            Self::Neutral => "neutral",
        }
    }

    /// Normalizes a raw backend label (any case, long or short form).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "angry" | "ang" | "anger" => Some(Self::Angry),
            "disgusted" | "disgust" => Some(Self::Disgusted),
            "fearful" | "fear" => Some(Self::Fearful),
            "sad" | "sadness" => Some(Self::Sad),
            "surprised" | "surprise" => Some(Self::Surprised),
            "happy" | "hap" | "happiness" => Some(Self::Happy),
            "neutral" | "neu" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// One emotion reading for an audio window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmotionResult {
    pub label: EmotionLabel,
    /// Classifier confidence for `label`, 0.0-1.0.
    pub score: f64,
    /// Aggregate negative-emotion risk for the window, 0.0-1.0.
    pub risk_level: f64,
}

impl EmotionResult {
    /// Stand-in reading used when the emotion backend fails for a window.
    pub fn neutral_fallback() -> Self {
        Self {
            label: EmotionLabel::Neutral,
            score: 0.5,
            risk_level: EmotionLabel::Neutral.base_risk(),
        }
    }
}

/// One fully perceived audio window: what was said and how it sounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perception {
    pub transcript: String,
    pub emotion: EmotionResult,
    /// Fraction of the window the speech gate scored as voiced.
    pub speech_ratio: f64,
    pub timestamp: DateTime<Utc>,
}

/// Where an audio window was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSource {
    #[serde(rename = "mic")]
    Microphone,
    #[serde(rename = "loopback")]
    Loopback,
}

impl AudioSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Microphone => "mic",
            Self::Loopback => "loopback",
        }
    }
}

// -----------------------------------------------------------------------------
// Agent actions
// -----------------------------------------------------------------------------

/// What the UI (or a side channel) should do with a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ShowPrompt,
    ShowKbResult,
    ShowRiskAlert,
    Escalate,
    DraftEmail,
    UpdateCrm,
    SearchLinkedin,
    /// Legacy clients still send `schedule_call` for this.
    #[serde(alias = "schedule_call")]
    ScheduleFollowup,
    #[default]
    None,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShowPrompt => "show_prompt",
            Self::ShowKbResult => "show_kb_result",
            Self::ShowRiskAlert => "show_risk_alert",
            Self::Escalate => "escalate",
            Self::DraftEmail => "draft_email",
            Self::UpdateCrm => "update_crm",
            Self::SearchLinkedin => "search_linkedin",
            Self::ScheduleFollowup => "schedule_followup",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Raw decision produced by a reflex rule or parsed out of a consultation
/// response, before it is stamped with an id and dispatched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionDraft {
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub kb_query: Option<String>,
}

/// A dispatched agent action as the UI sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub priority: Priority,
    pub headline: String,
    pub suggestion: String,
    /// Coaching category for prompt-style actions (e.g. "objection_handling").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kb_query: Option<String>,
    /// Knowledge lookup payload resolved before dispatch when `kb_query` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kb_data: Option<Value>,
    /// Payload filled in later by a slow side effect (LinkedIn lookup,
    /// follow-up scheduling). Set on the logged copy, not re-broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Action {
    /// Stamps a draft with a fresh id and the current time.
    pub fn from_draft(draft: ActionDraft) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            action_type: draft.action_type,
            priority: draft.priority,
            headline: draft.headline,
            suggestion: draft.suggestion,
            category: draft.category,
            reasoning: draft.reasoning,
            kb_query: draft.kb_query,
            kb_data: None,
            enriched_data: None,
            timestamp: Utc::now(),
        }
    }
}

// -----------------------------------------------------------------------------
// Session records
// -----------------------------------------------------------------------------

/// One line of the rolling call transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub emotion: EmotionResult,
    pub timestamp: DateTime<Utc>,
}

/// End-of-call summary sent to the UI and archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSummaryData {
    pub call_id: String,
    pub duration_minutes: f64,
    pub total_interventions: u64,
    pub peak_risk: f64,
    /// LLM-written analysis (outcome, main_issue, sentiment, follow-ups),
    /// flattened into the summary object on the wire.
    #[serde(flatten)]
    pub analysis: Value,
}

/// Operator feedback on a dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub action_id: String,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub outcome: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// -----------------------------------------------------------------------------
// Knowledge lookups
// -----------------------------------------------------------------------------

/// One scored knowledge-base hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbHit {
    pub content: String,
    pub title: String,
    pub category: String,
    pub relevance: f64,
}

/// Result envelope for a knowledge-base search. A failed lookup reports
/// `found: false` with `error` set instead of propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbLookup {
    pub query: String,
    pub results: Vec<KbHit>,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -----------------------------------------------------------------------------
// WebSocket wire messages
// -----------------------------------------------------------------------------

/// Per-window update pushed to the UI after each accepted perception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub transcript: String,
    pub emotion: EmotionResult,
    /// Smoothed session risk after this window, rounded to 3 decimals.
    pub risk_score: f64,
    pub timestamp: DateTime<Utc>,
    /// Competitor battlecard attached when the transcript names a rival product.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battlecard: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl PerceptionSnapshot {
    pub fn new(perception: &Perception, risk_score: f64) -> Self {
        Self {
            transcript: perception.transcript.clone(),
            emotion: perception.emotion,
            risk_score: round3(risk_score),
            timestamp: perception.timestamp,
            battlecard: None,
            source: None,
        }
    }
}

/// Messages the gateway pushes to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Connected {
        session_id: String,
        message: String,
    },
    CallStarted {
        call_id: String,
        timestamp: DateTime<Utc>,
    },
    PerceptionUpdate {
        data: PerceptionSnapshot,
    },
    AgentAction {
        data: Action,
    },
    CallSummary {
        data: CallSummaryData,
    },
    KbResult {
        data: KbLookup,
    },
    Shutdown,
}

/// Messages a client may send over the session socket. Unknown types fail
/// deserialization and are logged and skipped by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CallStart {
        #[serde(default)]
        call_metadata: Value,
    },
    CallEnd,
    Feedback {
        action_id: String,
        #[serde(default)]
        rating: Option<i32>,
        #[serde(default)]
        outcome: Option<String>,
    },
    ManualQuery {
        query: String,
    },
}

/// Rounds to 3 decimals for wire payloads.
pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
