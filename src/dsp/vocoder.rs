//! Phase-vocoder resynthesis along a target pitch trajectory.

use std::f64::consts::PI;

use super::pitch::PitchTrack;
use super::stft::{SpectralAnalyzer, SpectralFrames};
use crate::error::RetuneError;

const TWO_PI: f64 = 2.0 * PI;

/// Wraps a phase value to [-PI, PI].
#[inline]
fn wrap_phase(phase: f64) -> f64 {
    let p = phase + PI;
    p - (p / TWO_PI).floor() * TWO_PI - PI
}

/// Per-frame scaling of the instantaneous frequency.
///
/// Frames where either the estimate or the target is 0 Hz keep ratio 1.
pub fn pitch_ratios(original: &PitchTrack, target: &PitchTrack, frames: usize) -> Vec<f64> {
    (0..frames)
        .map(|t| {
            let from = original.f0.get(t).copied().unwrap_or(0.0);
            let to = target.f0.get(t).copied().unwrap_or(0.0);
            if from > 0.0 && to > 0.0 {
                to as f64 / from as f64
            } else {
                1.0
            }
        })
        .collect()
}

/// Builds a phase matrix whose per-bin advance follows `ratios`.
///
/// Frame 0 keeps its analysis phase; every later frame accumulates the
/// instantaneous frequency of the bin scaled by that frame's ratio.
pub fn retarget_phase(frames: &SpectralFrames, ratios: &[f64]) -> Vec<Vec<f32>> {
    let n = frames.frame_size as f64;
    let hop = frames.hop_size as f64;

    frames
        .phase
        .iter()
        .enumerate()
        .map(|(bin, row)| {
            let expected = TWO_PI * bin as f64 * hop / n;
            let mut out = Vec::with_capacity(row.len());
            let Some(&first) = row.first() else {
                return out;
            };
            let mut accum = first as f64;
            out.push(first);

            for t in 1..row.len() {
                let deviation = wrap_phase(row[t] as f64 - row[t - 1] as f64 - expected);
                let true_freq = expected + deviation;
                let ratio = ratios.get(t).copied().unwrap_or(1.0);
                accum = wrap_phase(accum + true_freq * ratio);
                out.push(accum as f32);
            }
            out
        })
        .collect()
}

/// Analyzes `samples`, retargets the phase toward `target` and resynthesizes
/// a signal of the same length.
pub fn resynthesize(
    analyzer: &SpectralAnalyzer,
    samples: &[f32],
    original: &PitchTrack,
    target: &PitchTrack,
) -> Result<Vec<f32>, RetuneError> {
    let frames = analyzer.analyze(samples);
    let ratios = pitch_ratios(original, target, frames.frames());
    let shifted = ratios.iter().filter(|&&r| (r - 1.0).abs() > 1e-9).count();
    log::debug!(
        "Phase vocoder: {} frames, {} bins, {} retargeted",
        frames.frames(),
        frames.bins(),
        shifted
    );

    let phase = retarget_phase(&frames, &ratios);
    analyzer.synthesize(&frames.magnitude, &phase, samples.len())
}
