//! Emotion scoring over gated audio windows.
//!
//! The HTTP backend expects a Hugging Face style audio-classification
//! endpoint: WAV in, `[{"label": "ang", "score": 0.7}, ...]` out. Short
//! backend labels are normalized through `EmotionLabel::parse`, and the
//! risk level is the combined weight of the negative classes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use maestro_core::{EmotionLabel, EmotionResult};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{info, warn};

use crate::audio::CANONICAL_SAMPLE_RATE;
use crate::error::{VoiceError, VoiceResult};
use crate::gate::rms;
use crate::transcriber::pcm_f32_to_wav;

/// Scores an audio window for emotional tone.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, samples: &[f32]) -> VoiceResult<EmotionResult>;
}

/// Emotion classifier backed by an audio-classification HTTP endpoint.
pub struct HttpEmotionClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpEmotionClassifier {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url,
            api_key,
        }
    }

    /// Reads `EMOTION_API_URL` and `EMOTION_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("EMOTION_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("EMOTION_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Some(Self::new(url, api_key))
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    async fn classify(&self, samples: &[f32]) -> VoiceResult<EmotionResult> {
        let wav = pcm_f32_to_wav(samples, CANONICAL_SAMPLE_RATE);

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "audio/wav")
            .body(wav);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Emotion(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Emotion(format!(
                "Emotion API returned {status}: {body}"
            )));
        }

        let scores: Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Emotion(e.to_string()))?;
        parse_classification(&scores)
    }
}

/// Folds a score array into one reading: highest-confidence label wins,
/// risk is the summed weight of {angry, disgusted, fearful, sad}.
fn parse_classification(scores: &Value) -> VoiceResult<EmotionResult> {
    let entries = scores
        .as_array()
        .ok_or_else(|| VoiceError::Emotion(format!("expected a score array, got: {scores}")))?;

    let mut best: Option<(EmotionLabel, f64)> = None;
    let mut risk = 0.0f64;
    for entry in entries {
        let raw_label = entry.get("label").and_then(Value::as_str).unwrap_or("");
        let score = entry.get("score").and_then(Value::as_f64).unwrap_or(0.0);
        let Some(label) = EmotionLabel::parse(raw_label) else {
            continue;
        };
        if label.is_negative() {
            risk += score;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((label, score));
        }
    }

    let (label, score) =
        best.ok_or_else(|| VoiceError::Emotion("no recognizable emotion labels".into()))?;
    Ok(EmotionResult {
        label,
        score,
        risk_level: risk.min(1.0),
    })
}

/// Loudness heuristic for environments with no emotion backend. A hot
/// signal on a support call usually means somebody is upset.
pub struct LoudnessEmotion;

#[async_trait]
impl EmotionClassifier for LoudnessEmotion {
    async fn classify(&self, samples: &[f32]) -> VoiceResult<EmotionResult> {
        if rms(samples) > 0.1 {
            Ok(EmotionResult {
                label: EmotionLabel::Angry,
                score: 0.6,
                risk_level: 0.6,
            })
        } else {
            Ok(EmotionResult {
                label: EmotionLabel::Neutral,
                score: 0.8,
                risk_level: 0.1,
            })
        }
    }
}

/// HTTP classification when the env is configured, loudness otherwise.
pub fn create_best_emotion() -> Arc<dyn EmotionClassifier> {
    match HttpEmotionClassifier::from_env() {
        Some(http) => {
            info!(target: "maestro::voice", "🎭 Emotion: HTTP backend at {}", http.url);
            Arc::new(http)
        }
        None => {
            warn!(
                target: "maestro::voice",
                "EMOTION_API_URL not set. Falling back to the loudness heuristic."
            );
            Arc::new(LoudnessEmotion)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_normalizes_short_labels() {
        let scores = json!([
            {"label": "neu", "score": 0.2},
            {"label": "ang", "score": 0.7},
            {"label": "hap", "score": 0.1}
        ]);
        let result = parse_classification(&scores).unwrap();
        assert_eq!(result.label, EmotionLabel::Angry);
        assert_eq!(result.score, 0.7);
        assert_eq!(result.risk_level, 0.7);
    }

    #[test]
    fn risk_sums_negative_classes_and_caps_at_one() {
        let scores = json!([
            {"label": "angry", "score": 0.5},
            {"label": "sad", "score": 0.4},
            {"label": "fearful", "score": 0.3},
            {"label": "neutral", "score": 0.1}
        ]);
        let result = parse_classification(&scores).unwrap();
        assert_eq!(result.label, EmotionLabel::Angry);
        assert_eq!(result.risk_level, 1.0);
    }

    #[test]
    fn unknown_labels_are_skipped() {
        let scores = json!([
            {"label": "bored", "score": 0.9},
            {"label": "happy", "score": 0.3}
        ]);
        let result = parse_classification(&scores).unwrap();
        assert_eq!(result.label, EmotionLabel::Happy);
    }

    #[test]
    fn all_unknown_labels_is_an_error() {
        let scores = json!([{"label": "bored", "score": 0.9}]);
        assert!(parse_classification(&scores).is_err());

        assert!(parse_classification(&json!({"label": "angry"})).is_err());
    }

    #[tokio::test]
    async fn loudness_flags_hot_audio_as_angry() {
        let loud = vec![0.5f32; 32_000];
        let result = LoudnessEmotion.classify(&loud).await.unwrap();
        assert_eq!(result.label, EmotionLabel::Angry);
        assert_eq!(result.risk_level, 0.6);
    }

    #[tokio::test]
    async fn loudness_scores_quiet_audio_as_neutral() {
        let quiet = vec![0.01f32; 32_000];
        let result = LoudnessEmotion.classify(&quiet).await.unwrap();
        assert_eq!(result.label, EmotionLabel::Neutral);
        assert_eq!(result.risk_level, 0.1);
    }
}
