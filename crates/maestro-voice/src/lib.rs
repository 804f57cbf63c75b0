//! # MAESTRO Voice - Call Audio Perception
//!
//! This crate turns whatever is audible on the agent's machine (a call
//! routed through a loopback monitor, or the raw microphone) into
//! `Perception` events for the decision engine. Built on bare metal
//! cpal capture for minimal latency.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Pipeline                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │  Capture     │→ │   Chunker    │→ │ Speech Gate  │      │
//! │  │  (cpal)      │  │ (2s / 0.3s)  │  │ (WebRTC VAD) │      │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘      │
//! │                                             ↓               │
//! │                    ┌──────────────┐  ┌──────────────┐      │
//! │   EngineEvent  ←───│    Merge     │← │ STT ‖ Emotion│      │
//! │   ::Perception     │              │  │ (concurrent) │      │
//! │                    └──────────────┘  └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod chunker;
pub mod emotion;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod transcriber;

pub use audio::{list_input_devices, CANONICAL_SAMPLE_RATE, LOOPBACK_DEVICE_PATTERNS};
pub use chunker::{WindowChunker, OVERLAP_SAMPLES, WINDOW_SAMPLES};
pub use emotion::{
    create_best_emotion, EmotionClassifier, HttpEmotionClassifier, LoudnessEmotion,
};
pub use error::{VoiceError, VoiceResult};
pub use gate::{
    create_best_gate, AudioWindow, EnergyGate, SpeechScorer, WebRtcGate,
    SPEECH_GATE_THRESHOLD,
};
pub use pipeline::{AudioPipeline, PipelineHandle};
pub use transcriber::{
    create_best_transcriber, pcm_f32_to_wav, transcription_backend_label, HttpTranscriber,
    PlaceholderTranscriber, ScriptedTranscriber, Transcriber,
};
