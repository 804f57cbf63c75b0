//! Speech gating: cheap filters that keep silence away from the models.
//!
//! Every completed window is scored for speech content before any
//! transcription or emotion call is made. Hold music, typing, and dead
//! air never leave the capture thread.

use tracing::{debug, warn};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Windows scoring below this fraction of voiced frames are dropped.
pub const SPEECH_GATE_THRESHOLD: f64 = 0.2;

/// WebRTC VAD frame length: 30 ms at 16 kHz.
const FRAME_SAMPLES: usize = 480;

/// A window that cleared the gate, ready for transcription.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    pub samples: Vec<f32>,
    /// Fraction of the window scored as voiced, 0.0-1.0.
    pub speech_ratio: f64,
}

/// Scores a window of 16 kHz mono audio for speech content.
///
/// Implementations are not required to be `Send`; the gate lives on the
/// capture thread for its whole life.
pub trait SpeechScorer {
    fn speech_ratio(&mut self, samples: &[f32]) -> f64;
}

/// WebRTC VAD over 30 ms frames. Score = voiced frames / total frames.
pub struct WebRtcGate {
    vad: Vad,
}

impl WebRtcGate {
    pub fn new() -> Self {
        let mut vad = Vad::new();
        vad.set_mode(VadMode::Aggressive);
        vad.set_sample_rate(SampleRate::Rate16kHz);
        Self { vad }
    }
}

impl Default for WebRtcGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechScorer for WebRtcGate {
    fn speech_ratio(&mut self, samples: &[f32]) -> f64 {
        let mut voiced = 0usize;
        let mut total = 0usize;
        for frame in samples.chunks_exact(FRAME_SAMPLES) {
            let frame_i16: Vec<i16> = frame
                .iter()
                .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
                .collect();
            total += 1;
            // An errored frame counts as unvoiced rather than killing
            // the stream.
            if self.vad.is_voice_segment(&frame_i16).unwrap_or(false) {
                voiced += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        voiced as f64 / total as f64
    }
}

/// RMS-energy fallback when the WebRTC VAD is unavailable.
pub struct EnergyGate;

impl SpeechScorer for EnergyGate {
    fn speech_ratio(&mut self, samples: &[f32]) -> f64 {
        (rms(samples) * 100.0).min(1.0)
    }
}

/// Root-mean-square amplitude of a window, in f64.
pub(crate) fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples
        .iter()
        .map(|&sample| sample as f64 * sample as f64)
        .sum::<f64>()
        / samples.len() as f64;
    mean_sq.sqrt()
}

/// Builds the best available gate: WebRTC VAD when its native core
/// passes a self-test, RMS energy otherwise.
pub fn create_best_gate() -> Box<dyn SpeechScorer> {
    let mut gate = WebRtcGate::new();
    let probe = [0i16; FRAME_SAMPLES];
    match gate.vad.is_voice_segment(&probe) {
        Ok(_) => {
            debug!(target: "maestro::voice", "Speech gate: WebRTC VAD");
            Box::new(gate)
        }
        Err(err) => {
            warn!(
                target: "maestro::voice",
                "WebRTC VAD self-test failed ({:?}). Falling back to the energy gate.",
                err
            );
            Box::new(EnergyGate)
        }
    }
}
