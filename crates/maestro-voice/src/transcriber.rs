//! Speech-to-text over gated audio windows.
//!
//! The production backend is any OpenAI-compatible `/audio/transcriptions`
//! endpoint (a local whisper.cpp server, Groq, OpenAI itself). Windows are
//! shipped as in-memory WAV files; nothing touches disk.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::Value;
use tracing::{info, warn};

use crate::audio::CANONICAL_SAMPLE_RATE;
use crate::error::{VoiceError, VoiceResult};

/// Domain hint sent with every request. Biases the model toward the
/// vocabulary it will actually hear on a support call.
const TRANSCRIPTION_PROMPT: &str = "This is a customer service call. \
Common phrases: account, subscription, cancel, refund, billing, \
support, upgrade, discount, complaint, issue, resolve.";

const DEFAULT_STT_MODEL: &str = "whisper-large-v3";

/// Turns an audio window into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[f32]) -> VoiceResult<String>;
}

/// Encodes 16 kHz mono f32 samples as an in-memory 16-bit PCM WAV file.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut wav = Vec::with_capacity(44 + samples.len() * 2);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        wav.extend_from_slice(&value.to_le_bytes());
    }
    wav
}

/// Transcriber backed by an OpenAI-compatible transcription API.
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTranscriber {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    /// Reads `STT_API_URL`, `STT_API_KEY`, and `STT_MODEL`.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("STT_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        let api_key = std::env::var("STT_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let model = std::env::var("STT_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string());
        Some(Self::new(base_url, api_key, model))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> VoiceResult<String> {
        let wav = pcm_f32_to_wav(samples, CANONICAL_SAMPLE_RATE);

        let file_part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("prompt", TRANSCRIPTION_PROMPT);

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Transcription(format!(
                "STT API returned {status}: {body}"
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

/// Fixed-response transcriber for environments with no STT backend.
pub struct PlaceholderTranscriber {
    response: String,
}

impl PlaceholderTranscriber {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Transcriber for PlaceholderTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> VoiceResult<String> {
        Ok(self.response.clone())
    }
}

/// Pops one queued line per window. Test double.
pub struct ScriptedTranscriber {
    lines: Mutex<VecDeque<String>>,
}

impl ScriptedTranscriber {
    pub fn new(lines: Vec<&str>) -> Self {
        Self {
            lines: Mutex::new(lines.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> VoiceResult<String> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| VoiceError::Transcription("script mutex poisoned".into()))?;
        Ok(lines.pop_front().unwrap_or_default())
    }
}

/// Label reported on the gateway health endpoint.
pub fn transcription_backend_label() -> &'static str {
    let configured = std::env::var("STT_API_URL")
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    if configured {
        "http"
    } else {
        "placeholder"
    }
}

/// HTTP transcription when the env is configured, placeholder otherwise.
pub fn create_best_transcriber() -> Arc<dyn Transcriber> {
    match HttpTranscriber::from_env() {
        Some(http) => {
            info!(
                target: "maestro::voice",
                "🗣️ Transcription: {} via {}",
                http.model,
                http.base_url
            );
            Arc::new(http)
        }
        None => {
            warn!(
                target: "maestro::voice",
                "STT_API_URL not set. Transcription is a placeholder; no transcripts will flow."
            );
            Arc::new(PlaceholderTranscriber::new(""))
        }
    }
}
