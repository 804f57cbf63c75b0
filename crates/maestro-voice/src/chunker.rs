//! Sliding-window accumulation over the raw capture stream.
//!
//! The capture callback hands this module whatever the device produced
//! (any rate, any channel count); it comes out the other side as fixed
//! 2 s windows of 16 kHz mono with a 0.3 s overlap between neighbours,
//! so a word straddling a window boundary is heard twice rather than
//! never.

use tracing::debug;

use crate::audio::CANONICAL_SAMPLE_RATE;

/// Samples per emitted window (2.0 s at 16 kHz).
pub const WINDOW_SAMPLES: usize = 32_000;

/// Samples shared between consecutive windows (0.3 s tail).
pub const OVERLAP_SAMPLES: usize = 4_800;

/// Accumulates device samples and emits canonical-format windows.
pub struct WindowChunker {
    buffer: Vec<f32>,
    source_rate: u32,
    channels: u16,
}

impl WindowChunker {
    pub fn new(source_rate: u32, channels: u16) -> Self {
        Self {
            buffer: Vec::with_capacity(WINDOW_SAMPLES * 2),
            source_rate,
            channels,
        }
    }

    /// Feeds one interleaved batch from the stream callback and returns
    /// every window it completed, oldest first.
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        if interleaved.is_empty() {
            return Vec::new();
        }

        let mono = downmix(interleaved, self.channels);
        let canonical = if self.source_rate == CANONICAL_SAMPLE_RATE {
            mono
        } else {
            resample(&mono, self.source_rate)
        };
        if canonical.is_empty() {
            debug!(
                target: "maestro::voice",
                "Resampling a {}-sample batch from {}Hz produced nothing. Dropping it.",
                interleaved.len(),
                self.source_rate
            );
            return Vec::new();
        }

        self.buffer.extend_from_slice(&canonical);

        let mut windows = Vec::new();
        while self.buffer.len() >= WINDOW_SAMPLES {
            windows.push(self.buffer[..WINDOW_SAMPLES].to_vec());
            self.buffer.drain(..WINDOW_SAMPLES - OVERLAP_SAMPLES);
        }
        windows
    }

    /// Samples currently waiting for the next window boundary.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Averages interleaved frames down to mono.
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resample from `source_rate` to 16 kHz.
fn resample(mono: &[f32], source_rate: u32) -> Vec<f32> {
    if mono.is_empty() {
        return Vec::new();
    }
    let out_len =
        (mono.len() as u64 * CANONICAL_SAMPLE_RATE as u64 / source_rate as u64) as usize;
    if out_len == 0 {
        return Vec::new();
    }

    let step = source_rate as f64 / CANONICAL_SAMPLE_RATE as f64;
    let last = mono.len() - 1;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = (pos as usize).min(last);
        let frac = (pos - idx as f64) as f32;
        let a = mono[idx];
        let b = mono[(idx + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn consecutive_windows_share_the_overlap_tail() {
        let mut chunker = WindowChunker::new(CANONICAL_SAMPLE_RATE, 1);
        let windows = chunker.push(&ramp(64_000));

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].len(), WINDOW_SAMPLES);
        assert_eq!(windows[1].len(), WINDOW_SAMPLES);
        // The second window starts 1.7 s in, replaying the last 0.3 s.
        assert_eq!(windows[1][0], (WINDOW_SAMPLES - OVERLAP_SAMPLES) as f32);
        assert_eq!(windows[0][WINDOW_SAMPLES - OVERLAP_SAMPLES..], windows[1][..OVERLAP_SAMPLES]);
    }

    #[test]
    fn windows_complete_across_multiple_pushes() {
        let mut chunker = WindowChunker::new(CANONICAL_SAMPLE_RATE, 1);
        assert!(chunker.push(&ramp(WINDOW_SAMPLES - 1)).is_empty());
        assert_eq!(chunker.pending(), WINDOW_SAMPLES - 1);

        let windows = chunker.push(&[123.0]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0][WINDOW_SAMPLES - 1], 123.0);
        assert_eq!(chunker.pending(), OVERLAP_SAMPLES);
    }

    #[test]
    fn stereo_input_is_averaged_to_mono() {
        let mut chunker = WindowChunker::new(CANONICAL_SAMPLE_RATE, 2);
        chunker.push(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(chunker.pending(), 2);

        let mixed = downmix(&[0.0, 1.0, 2.0, 3.0], 2);
        assert_eq!(mixed, vec![0.5, 2.5]);
    }

    #[test]
    fn native_rate_input_is_resampled_to_canonical() {
        // 48 kHz maps 3:1 onto the canonical rate, so interpolation
        // lands exactly on every third source sample.
        let mut chunker = WindowChunker::new(48_000, 1);
        let windows = chunker.push(&ramp(96_000));

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0][0], 0.0);
        assert_eq!(windows[0][100], 300.0);
    }

    #[test]
    fn batch_too_small_to_resample_is_dropped() {
        let mut chunker = WindowChunker::new(48_000, 1);
        assert!(chunker.push(&[0.5, 0.5]).is_empty());
        assert_eq!(chunker.pending(), 0);

        // The stream keeps working afterwards.
        let windows = chunker.push(&ramp(96_000));
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut chunker = WindowChunker::new(CANONICAL_SAMPLE_RATE, 1);
        assert!(chunker.push(&[]).is_empty());
        assert_eq!(chunker.pending(), 0);
    }
}
