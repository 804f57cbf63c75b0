//! Per-call session state: transcript ring, emotional trend, smoothed risk.
//!
//! The engine is the single writer. All rolling buffers are bounded so a
//! long call costs constant memory.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::shared::{Action, EmotionLabel, EmotionResult, Perception, TranscriptEntry};

/// Rolling transcript depth. Older lines fall off the front.
pub const TRANSCRIPT_CAPACITY: usize = 50;
/// Rolling emotion history depth.
pub const EMOTION_CAPACITY: usize = 15;
/// How many recent readings make up the reported trend.
pub const TREND_LEN: usize = 5;

/// Exponential smoothing weights for the session risk score.
pub const RISK_DECAY: f64 = 0.7;
pub const RISK_GAIN: f64 = 0.3;

/// Call lifecycle. Perceptions are only folded in while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Active,
    Ended,
}

/// Everything the engine knows about one live call.
#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    pub phase: CallPhase,
    pub call_id: Option<String>,
    pub call_metadata: Value,
    pub transcript: VecDeque<TranscriptEntry>,
    pub emotions: VecDeque<EmotionResult>,
    /// Smoothed risk, 0.0-1.0. Updated once per accepted perception.
    pub risk_score: f64,
    /// Highest raw per-window risk seen this call. Kept outside the emotion
    /// ring so an early spike survives eviction.
    pub peak_risk: f64,
    /// Accepted perceptions this call. Uncapped, unlike the transcript ring.
    pub perception_count: u64,
    /// Every action dispatched to the UI this call, in order.
    pub actions_taken: Vec<Action>,
    pub started_at: Option<Instant>,
    pub last_consultation_at: Option<Instant>,
    pub consultation_inflight: bool,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: CallPhase::Idle,
            call_id: None,
            call_metadata: Value::Null,
            transcript: VecDeque::with_capacity(TRANSCRIPT_CAPACITY),
            emotions: VecDeque::with_capacity(EMOTION_CAPACITY),
            risk_score: 0.0,
            peak_risk: 0.0,
            perception_count: 0,
            actions_taken: Vec::new(),
            started_at: None,
            last_consultation_at: None,
            consultation_inflight: false,
        }
    }

    /// Arms the session for a new call, clearing any previous rolling state.
    /// Returns the generated call id.
    pub fn begin_call(&mut self, metadata: Value) -> String {
        let call_id = Uuid::new_v4().to_string();
        self.phase = CallPhase::Active;
        self.call_id = Some(call_id.clone());
        self.call_metadata = metadata;
        self.transcript.clear();
        self.emotions.clear();
        self.risk_score = 0.0;
        self.peak_risk = 0.0;
        self.perception_count = 0;
        self.actions_taken.clear();
        self.started_at = Some(Instant::now());
        self.last_consultation_at = None;
        self.consultation_inflight = false;
        call_id
    }

    pub fn end_call(&mut self) {
        self.phase = CallPhase::Ended;
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.phase == CallPhase::Active
    }

    /// Folds one perception into the rolling state and returns the updated
    /// risk score. The smoothing is plain f64 arithmetic in a fixed order so
    /// the same inputs always produce the same sequence.
    pub fn observe(&mut self, perception: &Perception) -> f64 {
        self.perception_count += 1;

        let incoming = perception.emotion.risk_level;
        self.risk_score = (self.risk_score * RISK_DECAY + incoming * RISK_GAIN).clamp(0.0, 1.0);
        if incoming > self.peak_risk {
            self.peak_risk = incoming;
        }

        self.emotions.push_back(perception.emotion);
        while self.emotions.len() > EMOTION_CAPACITY {
            self.emotions.pop_front();
        }

        self.transcript.push_back(TranscriptEntry {
            text: perception.transcript.clone(),
            emotion: perception.emotion,
            timestamp: perception.timestamp,
        });
        while self.transcript.len() > TRANSCRIPT_CAPACITY {
            self.transcript.pop_front();
        }

        self.risk_score
    }

    /// Records a dispatched action in the call log.
    pub fn record_action(&mut self, action: Action) {
        self.actions_taken.push(action);
    }

    /// Labels of the most recent emotions, oldest first.
    pub fn emotion_trend(&self) -> Vec<EmotionLabel> {
        let skip = self.emotions.len().saturating_sub(TREND_LEN);
        self.emotions.iter().skip(skip).map(|e| e.label).collect()
    }

    /// The last `n` transcript lines joined with " | " for prompt context.
    pub fn recent_context(&self, n: usize) -> String {
        let skip = self.transcript.len().saturating_sub(n);
        self.transcript
            .iter()
            .skip(skip)
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Minutes since call start, rounded to one decimal. 0.0 before call_start.
    pub fn duration_minutes(&self) -> f64 {
        match self.started_at {
            Some(t) => {
                let minutes = t.elapsed().as_secs_f64() / 60.0;
                (minutes * 10.0).round() / 10.0
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{ActionDraft, EmotionLabel};
    use chrono::Utc;

    fn perception(text: &str, risk: f64) -> Perception {
        Perception {
            transcript: text.to_string(),
            emotion: EmotionResult {
                label: EmotionLabel::Neutral,
                score: 0.5,
                risk_level: risk,
            },
            speech_ratio: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn risk_smoothing_is_exactly_reproducible() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);

        let risks = [0.9, 0.1, 0.5, 0.7, 0.3, 0.95];
        let mut expected = 0.0f64;
        for r in risks {
            let updated = session.observe(&perception("line", r));
            expected = (expected * RISK_DECAY + r * RISK_GAIN).clamp(0.0, 1.0);
            assert_eq!(updated, expected);
        }
        assert_eq!(session.risk_score, expected);
    }

    #[tokio::test]
    async fn peak_risk_tracks_raw_window_maximum() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);

        session.observe(&perception("a", 0.92));
        session.observe(&perception("b", 0.0));
        session.observe(&perception("c", 0.1));

        // The smoothed score never reached the raw spike, but the peak did.
        assert!(session.risk_score < 0.92);
        assert_eq!(session.peak_risk, 0.92);
    }

    #[tokio::test]
    async fn peak_risk_survives_emotion_ring_eviction() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);

        session.observe(&perception("spike", 0.95));
        for i in 0..EMOTION_CAPACITY {
            session.observe(&perception(&format!("calm {i}"), 0.1));
        }

        assert!(session.emotions.iter().all(|e| e.risk_level < 0.95));
        assert_eq!(session.peak_risk, 0.95);
    }

    #[tokio::test]
    async fn transcript_ring_evicts_oldest_at_capacity() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);

        for i in 1..=55 {
            session.observe(&perception(&format!("line {i}"), 0.1));
        }

        assert_eq!(session.transcript.len(), TRANSCRIPT_CAPACITY);
        assert_eq!(session.transcript.front().unwrap().text, "line 6");
        assert_eq!(session.transcript.back().unwrap().text, "line 55");
        assert_eq!(session.perception_count, 55);
    }

    #[tokio::test]
    async fn emotion_trend_reports_last_five_oldest_first() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);

        let labels = [
            EmotionLabel::Happy,
            EmotionLabel::Neutral,
            EmotionLabel::Neutral,
            EmotionLabel::Sad,
            EmotionLabel::Angry,
            EmotionLabel::Angry,
            EmotionLabel::Angry,
        ];
        for label in labels {
            let mut p = perception("line", label.base_risk());
            p.emotion.label = label;
            session.observe(&p);
        }

        assert_eq!(
            session.emotion_trend(),
            vec![
                EmotionLabel::Neutral,
                EmotionLabel::Sad,
                EmotionLabel::Angry,
                EmotionLabel::Angry,
                EmotionLabel::Angry,
            ]
        );
    }

    #[tokio::test]
    async fn recent_context_joins_last_lines() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);
        for text in ["one", "two", "three"] {
            session.observe(&perception(text, 0.1));
        }
        assert_eq!(session.recent_context(2), "two | three");
        assert_eq!(session.recent_context(10), "one | two | three");
    }

    #[tokio::test]
    async fn begin_call_resets_previous_rolling_state() {
        let mut session = SessionState::new("s1");
        session.begin_call(Value::Null);
        session.observe(&perception("old", 0.9));
        session.record_action(Action::from_draft(ActionDraft::default()));
        session.end_call();
        assert_eq!(session.phase, CallPhase::Ended);

        session.begin_call(serde_json::json!({"customer": "Acme"}));
        assert_eq!(session.phase, CallPhase::Active);
        assert!(session.transcript.is_empty());
        assert!(session.actions_taken.is_empty());
        assert_eq!(session.risk_score, 0.0);
        assert_eq!(session.peak_risk, 0.0);
        assert_eq!(session.perception_count, 0);
    }

    #[tokio::test]
    async fn duration_is_zero_before_call_start() {
        let session = SessionState::new("s1");
        assert_eq!(session.duration_minutes(), 0.0);
    }
}
