//! Spectral-flux onset detection and beat tracking.

use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};

use super::{BeatTracker, OnsetDetector};
use crate::audio::waveform::Waveform;
use crate::dsp::stft::hann_window;
use crate::rhythm::grid::BeatGrid;

/// Beats per bar used to assign downbeats.
const BEATS_PER_BAR: usize = 4;
/// Tempo assumed when no plausible inter-peak interval is found.
const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Positive spectral change per analysis frame.
#[derive(Clone, Copy, Debug)]
struct FluxFrame {
    /// Centre of the frame in sample frames.
    center: usize,
    flux: f32,
}

fn spectral_flux(samples: &[f32], fft_size: usize, hop_size: usize) -> Vec<FluxFrame> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let hann = hann_window(fft_size);
    let half = fft_size / 2;

    let mut prev_magnitudes = vec![0.0f32; half];
    let mut flux_values = Vec::new();
    let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_size];

    let mut pos = 0;
    while pos + fft_size <= samples.len() {
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(samples[pos + i] * hann[i], 0.0);
        }
        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..half].iter().map(|c| c.norm()).collect();
        let flux: f32 = magnitudes
            .iter()
            .zip(prev_magnitudes.iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();

        flux_values.push(FluxFrame {
            center: pos + half,
            flux,
        });
        prev_magnitudes = magnitudes;
        pos += hop_size;
    }

    flux_values
}

/// Local maxima above an adaptive threshold, at least `min_gap` frames apart.
fn pick_peaks(flux: &[FluxFrame], window: usize, min_gap: usize) -> Vec<usize> {
    let mut peaks: Vec<usize> = Vec::new();

    for i in 0..flux.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(flux.len());
        let local_mean: f32 =
            flux[start..end].iter().map(|f| f.flux).sum::<f32>() / (end - start) as f32;

        let threshold = local_mean * 1.5 + 0.01;
        if flux[i].flux <= threshold {
            continue;
        }

        let is_peak = (i == 0 || flux[i].flux >= flux[i - 1].flux)
            && (i == flux.len() - 1 || flux[i].flux >= flux[i + 1].flux);
        let far_enough = peaks
            .last()
            .map_or(true, |&last| flux[i].center - flux[last].center > min_gap);

        if is_peak && far_enough {
            peaks.push(i);
        }
    }

    peaks
}

/// Tempo from the median of plausible (60-200 BPM) peak intervals.
fn estimate_tempo(peak_times: &[f64]) -> f64 {
    let mut reasonable: Vec<f64> = peak_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return DEFAULT_TEMPO_BPM;
    }

    reasonable.sort_by(|a, b| a.total_cmp(b));
    60.0 / reasonable[reasonable.len() / 2]
}

pub struct FluxOnsetDetector {
    pub fft_size: usize,
    pub hop_size: usize,
    /// Minimum spacing between onsets in seconds.
    pub min_gap: f32,
}

impl Default for FluxOnsetDetector {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            hop_size: 256,
            min_gap: 0.05,
        }
    }
}

impl OnsetDetector for FluxOnsetDetector {
    fn detect(&self, vocal: &Waveform) -> Result<Vec<usize>> {
        let mono = vocal.to_mono();
        let flux = spectral_flux(&mono, self.fft_size, self.hop_size);
        let min_gap = (self.min_gap * vocal.sample_rate as f32) as usize;
        let onsets: Vec<usize> = pick_peaks(&flux, 10, min_gap)
            .into_iter()
            .map(|i| flux[i].center)
            .collect();
        log::info!("Detected {} vocal onsets", onsets.len());
        Ok(onsets)
    }
}

pub struct FluxBeatTracker {
    pub fft_size: usize,
    pub hop_size: usize,
}

impl Default for FluxBeatTracker {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 512,
        }
    }
}

impl BeatTracker for FluxBeatTracker {
    fn track(&self, instrumental: &Waveform) -> Result<BeatGrid> {
        let mono = instrumental.to_mono();
        let sr = instrumental.sample_rate as f64;
        let flux = spectral_flux(&mono, self.fft_size, self.hop_size);
        let peaks = pick_peaks(&flux, 20, (0.1 * sr) as usize);

        if peaks.len() < 2 {
            log::warn!("Beat tracker found {} peaks, no grid", peaks.len());
            return Ok(BeatGrid::default());
        }

        let peak_times: Vec<f64> = peaks.iter().map(|&i| flux[i].center as f64 / sr).collect();
        let tempo = estimate_tempo(&peak_times);
        let period = 60.0 / tempo;
        let duration = instrumental.frames() as f64 / sr;

        // Regular grid through the first peak, extended back to time zero.
        let anchor = peak_times[0] - (peak_times[0] / period).floor() * period;
        let count = ((duration - anchor) / period).floor() as usize + 1;
        let times: Vec<f64> = (0..count).map(|k| anchor + k as f64 * period).collect();

        let flux_at = |time: f64| -> f32 {
            let center = (time * sr) as usize;
            let idx = flux.partition_point(|f| f.center < center);
            flux.get(idx).map_or(0.0, |f| f.flux)
        };
        let bar_phase = (0..BEATS_PER_BAR)
            .max_by(|&a, &b| {
                let score = |phase: usize| -> f32 {
                    times
                        .iter()
                        .skip(phase)
                        .step_by(BEATS_PER_BAR)
                        .map(|&t| flux_at(t))
                        .sum()
                };
                score(a).total_cmp(&score(b))
            })
            .unwrap_or(0);
        let downbeats = (0..times.len())
            .map(|k| k % BEATS_PER_BAR == bar_phase)
            .collect();

        log::info!(
            "Beat grid: {} beats, tempo {:.1} BPM, {} flux peaks",
            times.len(),
            tempo,
            peaks.len()
        );
        Ok(BeatGrid::new(times, downbeats))
    }
}
