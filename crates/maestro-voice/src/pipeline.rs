//! Perception fan-out: gated windows become engine events.
//!
//! One pipeline owns one capture device. Every window that clears the
//! speech gate is transcribed and emotion-scored concurrently, merged
//! into a `Perception`, and pushed into the session's engine. Windows
//! are processed strictly in capture order; only the two model calls
//! for a single window overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use maestro_core::{AudioSource, EmotionResult, EngineEvent, Perception};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::audio;
use crate::emotion::{create_best_emotion, EmotionClassifier};
use crate::error::{VoiceError, VoiceResult};
use crate::gate::AudioWindow;
use crate::transcriber::{create_best_transcriber, Transcriber};

/// A capture pipeline bound to one session's engine.
pub struct AudioPipeline;

impl AudioPipeline {
    /// Starts capture for `session_id` and wires perceptions into the
    /// engine's event channel. Returns once the device is open, or with
    /// the device error when it is not.
    pub async fn start(
        session_id: &str,
        events: UnboundedSender<EngineEvent>,
    ) -> VoiceResult<PipelineHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let (window_tx, window_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_stop = stop.clone();
        let capture = thread::Builder::new()
            .name("maestro-capture".to_string())
            .spawn(move || audio::run_capture(thread_stop, window_tx, ready_tx))?;

        let source = match ready_rx.await {
            Ok(Ok(source)) => source,
            Ok(Err(err)) => {
                let _ = tokio::task::spawn_blocking(move || capture.join()).await;
                return Err(err);
            }
            Err(_) => {
                let _ = tokio::task::spawn_blocking(move || capture.join()).await;
                return Err(VoiceError::ChannelClosed(
                    "capture thread exited before reporting readiness".into(),
                ));
            }
        };

        let transcriber = create_best_transcriber();
        let emotion = create_best_emotion();
        let pump = tokio::spawn(pump_windows(
            session_id.to_string(),
            source,
            window_rx,
            events,
            transcriber,
            emotion,
        ));

        info!(
            target: "maestro::voice",
            "🎧 Audio pipeline running for session {session_id} (source: {})",
            source.as_str()
        );
        Ok(PipelineHandle {
            stop,
            capture: Some(capture),
            pump,
        })
    }
}

/// Handle to a running pipeline. Dropping it without `shutdown` leaves
/// the capture thread running until its channels close.
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    capture: Option<thread::JoinHandle<()>>,
    pump: tokio::task::JoinHandle<()>,
}

impl PipelineHandle {
    /// Stops capture, releases the device, and drains the pump.
    pub async fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        let _ = self.pump.await;
        debug!(target: "maestro::voice", "Audio pipeline shut down");
    }
}

async fn pump_windows(
    session_id: String,
    source: AudioSource,
    mut windows: UnboundedReceiver<AudioWindow>,
    events: UnboundedSender<EngineEvent>,
    transcriber: Arc<dyn Transcriber>,
    emotion: Arc<dyn EmotionClassifier>,
) {
    while let Some(window) = windows.recv().await {
        let (transcript, reading) = tokio::join!(
            transcriber.transcribe(&window.samples),
            emotion.classify(&window.samples),
        );

        let transcript = match transcript {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "maestro::voice", "Transcription failed: {err}");
                continue;
            }
        };
        if transcript.trim().is_empty() {
            continue;
        }

        let emotion_result = match reading {
            Ok(result) => result,
            Err(err) => {
                warn!(target: "maestro::voice", "Emotion scoring failed: {err}");
                EmotionResult::neutral_fallback()
            }
        };

        let perception = Perception {
            transcript,
            emotion: emotion_result,
            speech_ratio: window.speech_ratio,
            timestamp: Utc::now(),
        };
        if events
            .send(EngineEvent::Perception { perception, source })
            .is_err()
        {
            debug!(
                target: "maestro::voice",
                "Engine for session {session_id} is gone. Stopping the pump."
            );
            break;
        }
    }
    debug!(target: "maestro::voice", "Perception pump for session {session_id} finished");
}
