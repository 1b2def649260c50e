//! Short-time Fourier analysis and overlap-add resynthesis.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::error::RetuneError;

/// Window-sum floor below which overlap-add output is left unnormalized.
const WINDOW_SUM_FLOOR: f32 = 1e-8;

/// Magnitude and phase matrices indexed `[bin][frame]`.
#[derive(Clone, Debug)]
pub struct SpectralFrames {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Length of the signal the frames were computed from.
    pub num_samples: usize,
    pub magnitude: Vec<Vec<f32>>,
    pub phase: Vec<Vec<f32>>,
}

impl SpectralFrames {
    pub fn bins(&self) -> usize {
        self.magnitude.len()
    }

    pub fn frames(&self) -> usize {
        self.magnitude.first().map_or(0, |row| row.len())
    }
}

/// Planned forward/inverse transforms for one (frame size, hop size) pair.
pub struct SpectralAnalyzer {
    frame_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl SpectralAnalyzer {
    pub fn new(frame_size: usize, hop_size: usize) -> Result<Self, RetuneError> {
        let invalid = |reason| RetuneError::InvalidFrameConfig {
            frame_size,
            hop_size,
            reason,
        };
        if frame_size < 2 || frame_size % 2 != 0 {
            return Err(invalid("frame size must be even and at least 2"));
        }
        if hop_size == 0 {
            return Err(invalid("hop size must be positive"));
        }
        if hop_size >= frame_size {
            return Err(invalid("hop size must be smaller than frame size"));
        }

        // The planner probes CPU features once here; every frame reuses the plans.
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);

        Ok(Self {
            frame_size,
            hop_size,
            window: hann_window(frame_size),
            forward,
            inverse,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Number of analysis frames produced for a signal of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        let padded = len + self.frame_size;
        if padded <= self.frame_size {
            return 1;
        }
        1 + (padded - self.frame_size).div_ceil(self.hop_size)
    }

    /// Sample index (in the unpadded signal) at the centre of frame `t`.
    pub fn frame_center(&self, t: usize) -> usize {
        t * self.hop_size
    }

    /// Centres the signal with `frame_size / 2` zeros each side and zero-pads
    /// the tail so the last frame is complete.
    fn padded(&self, samples: &[f32]) -> Vec<f32> {
        let num_frames = self.frame_count(samples.len());
        let total = (num_frames - 1) * self.hop_size + self.frame_size;
        let mut padded = vec![0.0f32; total];
        let offset = self.frame_size / 2;
        padded[offset..offset + samples.len()].copy_from_slice(samples);
        padded
    }

    pub fn analyze(&self, samples: &[f32]) -> SpectralFrames {
        let padded = self.padded(samples);
        let num_frames = self.frame_count(samples.len());
        let num_bins = self.num_bins();

        let columns: Vec<(Vec<f32>, Vec<f32>)> = (0..num_frames)
            .into_par_iter()
            .map(|t| {
                let start = t * self.hop_size;
                let mut buffer: Vec<Complex<f32>> = padded[start..start + self.frame_size]
                    .iter()
                    .zip(self.window.iter())
                    .map(|(&s, &w)| Complex::new(s * w, 0.0))
                    .collect();
                self.forward.process(&mut buffer);

                let mags = buffer[..num_bins].iter().map(|c| c.norm()).collect();
                let phases = buffer[..num_bins].iter().map(|c| c.im.atan2(c.re)).collect();
                (mags, phases)
            })
            .collect();

        let mut magnitude = vec![vec![0.0f32; num_frames]; num_bins];
        let mut phase = vec![vec![0.0f32; num_frames]; num_bins];
        for (t, (mags, phases)) in columns.into_iter().enumerate() {
            for k in 0..num_bins {
                magnitude[k][t] = mags[k];
                phase[k][t] = phases[k];
            }
        }

        SpectralFrames {
            frame_size: self.frame_size,
            hop_size: self.hop_size,
            num_samples: samples.len(),
            magnitude,
            phase,
        }
    }

    /// Rebuilds a waveform of `length` samples from magnitude and phase.
    pub fn synthesize(
        &self,
        magnitude: &[Vec<f32>],
        phase: &[Vec<f32>],
        length: usize,
    ) -> Result<Vec<f32>, RetuneError> {
        let num_bins = self.num_bins();
        let num_frames = magnitude.first().map_or(0, |row| row.len());
        let consistent = magnitude.len() == num_bins
            && phase.len() == num_bins
            && magnitude.iter().chain(phase.iter()).all(|row| row.len() == num_frames);
        if !consistent {
            return Err(RetuneError::ShapeMismatch {
                expected_bins: num_bins,
                expected_frames: num_frames,
                bins: magnitude.len().max(phase.len()),
                frames: phase.first().map_or(0, |row| row.len()),
            });
        }
        if num_frames == 0 {
            return Ok(vec![0.0; length]);
        }

        let n = self.frame_size;
        let norm = 1.0 / n as f32;

        let frames: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map(|t| {
                let mut spectrum = vec![Complex::new(0.0f32, 0.0); n];
                for k in 0..num_bins {
                    spectrum[k] = Complex::from_polar(magnitude[k][t], phase[k][t]);
                }
                for k in num_bins..n {
                    spectrum[k] = spectrum[n - k].conj();
                }
                self.inverse.process(&mut spectrum);
                spectrum
                    .iter()
                    .zip(self.window.iter())
                    .map(|(c, &w)| c.re * norm * w)
                    .collect()
            })
            .collect();

        let total = (num_frames - 1) * self.hop_size + n;
        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];
        for (t, frame) in frames.iter().enumerate() {
            let start = t * self.hop_size;
            for (i, (&s, &w)) in frame.iter().zip(self.window.iter()).enumerate() {
                output[start + i] += s;
                window_sum[start + i] += w * w;
            }
        }
        for (s, &ws) in output.iter_mut().zip(window_sum.iter()) {
            if ws > WINDOW_SUM_FLOOR {
                *s /= ws;
            }
        }

        let offset = n / 2;
        let mut trimmed: Vec<f32> = output.into_iter().skip(offset).take(length).collect();
        trimmed.resize(length, 0.0);
        Ok(trimmed)
    }

    /// Inverse of [`analyze`](Self::analyze) for an unmodified frame set.
    pub fn resynthesize(&self, frames: &SpectralFrames) -> Result<Vec<f32>, RetuneError> {
        self.synthesize(&frames.magnitude, &frames.phase, frames.num_samples)
    }
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}
