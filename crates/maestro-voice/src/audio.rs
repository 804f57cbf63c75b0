//! Call audio capture.
//!
//! Opens a cpal input stream on the best available device. A virtual
//! loopback monitor (call audio routed through a null sink) beats the
//! raw microphone, because it hears the customer instead of the agent.
//! The stream callback stays non-blocking: it only feeds the chunker
//! and hands completed windows to the capture thread, which owns the
//! speech gate and forwards anything that clears it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use maestro_core::AudioSource;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::chunker::WindowChunker;
use crate::error::{VoiceError, VoiceResult};
use crate::gate::{create_best_gate, AudioWindow, SPEECH_GATE_THRESHOLD};

/// Working sample rate for every model in the pipeline.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Device name fragments that mark a virtual loopback monitor, in
/// priority order. `maestro_capture` is the null sink the setup script
/// creates for routing call audio.
pub const LOOPBACK_DEVICE_PATTERNS: &[&str] = &[
    "maestro_capture.monitor",
    "maestro_capture",
    ".monitor",
    "pulse",
];

/// Lists the names of every input device cpal can see.
pub fn list_input_devices() -> VoiceResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Capture thread body: opens the stream, reports readiness, then gates
/// completed windows until the stop flag flips or both channels close.
pub(crate) fn run_capture(
    stop: Arc<AtomicBool>,
    windows: UnboundedSender<AudioWindow>,
    ready: oneshot::Sender<VoiceResult<AudioSource>>,
) {
    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<Vec<f32>>();
    let (stream, source) = match open_stream(raw_tx) {
        Ok(pair) => pair,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(source));

    // The gate is not `Send`; it lives and dies on this thread.
    let mut gate = create_best_gate();

    // recv_timeout doubles as the ~100 ms park between stop checks.
    while !stop.load(Ordering::Relaxed) {
        match raw_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(samples) => {
                let speech_ratio = gate.speech_ratio(&samples);
                if speech_ratio < SPEECH_GATE_THRESHOLD {
                    debug!(
                        target: "maestro::voice",
                        "Window gated out (speech ratio {:.2})",
                        speech_ratio
                    );
                    continue;
                }
                if windows
                    .send(AudioWindow {
                        samples,
                        speech_ratio,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    debug!(target: "maestro::voice", "Audio capture stopped");
}

fn open_stream(raw_tx: Sender<Vec<f32>>) -> VoiceResult<(cpal::Stream, AudioSource)> {
    let host = cpal::default_host();
    let (device, source) = find_capture_device(&host)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    // 16 kHz mono first; virtual monitors usually accept it and the
    // chunker then has nothing to convert.
    let canonical = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(CANONICAL_SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    };
    match build_f32_stream(
        &device,
        &canonical,
        WindowChunker::new(CANONICAL_SAMPLE_RATE, 1),
        raw_tx.clone(),
    ) {
        Ok(stream) => {
            info!(
                target: "maestro::voice",
                "🎤 Audio capture started at {CANONICAL_SAMPLE_RATE}Hz on '{device_name}'"
            );
            return Ok((stream, source));
        }
        Err(err) => {
            warn!(
                target: "maestro::voice",
                "16kHz capture refused by '{device_name}' ({err}). Trying the native config."
            );
        }
    }

    let supported = device.default_input_config()?;
    let rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: StreamConfig = supported.config();
    let chunker = WindowChunker::new(rate, channels);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_f32_stream(&device, &config, chunker, raw_tx)?,
        SampleFormat::I16 => build_i16_stream(&device, &config, chunker, raw_tx)?,
        other => return Err(VoiceError::SampleFormat(format!("{other:?}"))),
    };
    info!(
        target: "maestro::voice",
        "🎤 Audio capture started at {rate}Hz ({channels}ch) on '{device_name}'"
    );
    Ok((stream, source))
}

fn build_f32_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut chunker: WindowChunker,
    raw_tx: Sender<Vec<f32>>,
) -> VoiceResult<cpal::Stream> {
    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for window in chunker.push(data) {
                if raw_tx.send(window).is_err() {
                    return;
                }
            }
        },
        |err| warn!(target: "maestro::voice", "Audio stream error: {err}"),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn build_i16_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut chunker: WindowChunker,
    raw_tx: Sender<Vec<f32>>,
) -> VoiceResult<cpal::Stream> {
    let stream = device.build_input_stream(
        config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
            for window in chunker.push(&samples) {
                if raw_tx.send(window).is_err() {
                    return;
                }
            }
        },
        |err| warn!(target: "maestro::voice", "Audio stream error: {err}"),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

fn find_capture_device(host: &cpal::Host) -> VoiceResult<(cpal::Device, AudioSource)> {
    let devices: Vec<cpal::Device> = host.input_devices()?.collect();

    if let Some(wanted) = std::env::var("MAESTRO_AUDIO_DEVICE")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        let needle = wanted.to_lowercase();
        for device in &devices {
            let Ok(name) = device.name() else { continue };
            if name.to_lowercase().contains(&needle) {
                info!(target: "maestro::voice", "Using configured audio device: {name}");
                return Ok((device.clone(), source_for(&name)));
            }
        }
        warn!(
            target: "maestro::voice",
            "Configured audio device '{wanted}' not found. Scanning for a monitor instead."
        );
    }

    for pattern in LOOPBACK_DEVICE_PATTERNS {
        for device in &devices {
            let Ok(name) = device.name() else { continue };
            if name.to_lowercase().contains(pattern) {
                info!(target: "maestro::voice", "🎤 Auto-selected loopback device: {name}");
                return Ok((device.clone(), source_for(&name)));
            }
        }
    }

    info!(target: "maestro::voice", "No virtual monitor found. Using the default microphone.");
    host.default_input_device()
        .map(|device| (device, AudioSource::Microphone))
        .ok_or_else(|| VoiceError::AudioDevice("no input device available".into()))
}

/// Tags what a device hears. Monitor devices carry the far side of the
/// call; anything else is treated as the agent's microphone.
fn source_for(name: &str) -> AudioSource {
    let lower = name.to_lowercase();
    if lower.contains(".monitor") || lower.contains("maestro_capture") {
        AudioSource::Loopback
    } else {
        AudioSource::Microphone
    }
}
