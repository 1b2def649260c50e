use anyhow::Result;
use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;
use rayon::prelude::*;

use super::PitchTracker;
use crate::dsp::pitch::PitchTrack;
use crate::dsp::stft::SpectralAnalyzer;

/// Frame-synchronous f0 estimation with the McLeod pitch method.
pub struct McLeodTracker {
    pub window: usize,
    /// Minimum summed signal power for a frame to be considered.
    pub power_threshold: f32,
    /// Minimum normalized clarity for a frame to count as voiced.
    pub clarity_threshold: f32,
    pub min_hz: f32,
    pub max_hz: f32,
}

impl Default for McLeodTracker {
    fn default() -> Self {
        Self {
            window: 2048,
            power_threshold: 0.5,
            clarity_threshold: 0.7,
            min_hz: 65.0,
            max_hz: 2093.0,
        }
    }
}

impl PitchTracker for McLeodTracker {
    fn track(&self, samples: &[f32], sample_rate: u32, analyzer: &SpectralAnalyzer) -> Result<PitchTrack> {
        if self.window < 4 {
            anyhow::bail!("pitch window too small: {}", self.window);
        }
        let frames = analyzer.frame_count(samples.len());
        let half = self.window / 2;

        let estimates: Vec<f32> = (0..frames)
            .into_par_iter()
            .map_init(
                || (McLeodDetector::<f32>::new(self.window, half), vec![0.0f32; self.window]),
                |(detector, buf), t| {
                    let center = analyzer.frame_center(t);
                    for (i, slot) in buf.iter_mut().enumerate() {
                        // Window is centred on the frame; out-of-range samples are zero.
                        *slot = (center + i)
                            .checked_sub(half)
                            .and_then(|idx| samples.get(idx))
                            .copied()
                            .unwrap_or(0.0);
                    }
                    detector
                        .get_pitch(&buf[..], sample_rate as usize, self.power_threshold, self.clarity_threshold)
                        .map(|p| p.frequency)
                        .filter(|f| f.is_finite() && (self.min_hz..=self.max_hz).contains(f))
                        .unwrap_or(0.0)
                },
            )
            .collect();

        let track = PitchTrack::from_frequencies(estimates);
        log::info!(
            "Pitch track: {} frames, {} voiced",
            track.len(),
            track.voiced_frames()
        );
        Ok(track)
    }
}
