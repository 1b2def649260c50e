//! Per-frame target pitch computation: semitone snap, humanization, blend.

use rand::Rng;

/// Maximum humanization deviation in cents at `humanize_amount = 1`.
const HUMANIZE_MAX_CENTS: f32 = 15.0;

/// Per-frame fundamental frequency estimate with voicing flags.
///
/// Unvoiced and non-finite frames always carry 0 Hz.
#[derive(Clone, Debug, PartialEq)]
pub struct PitchTrack {
    pub f0: Vec<f32>,
    pub voiced: Vec<bool>,
}

/// Desired frequency per frame, same shape as the estimate it came from.
pub type TargetPitchTrack = PitchTrack;

impl PitchTrack {
    pub fn new(f0: Vec<f32>, voiced: Vec<bool>) -> Self {
        let len = f0.len().min(voiced.len());
        let mut track = Self {
            f0: f0.into_iter().take(len).collect(),
            voiced: voiced.into_iter().take(len).collect(),
        };
        for (f, v) in track.f0.iter_mut().zip(track.voiced.iter_mut()) {
            if !f.is_finite() || *f <= 0.0 || !*v {
                *f = 0.0;
                *v = false;
            }
        }
        track
    }

    /// Builds a track from raw frequencies, treating every positive value as voiced.
    pub fn from_frequencies(f0: Vec<f32>) -> Self {
        let voiced = f0.iter().map(|&f| f.is_finite() && f > 0.0).collect();
        Self::new(f0, voiced)
    }

    pub fn len(&self) -> usize {
        self.f0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.f0.is_empty()
    }

    pub fn voiced_frames(&self) -> usize {
        self.voiced.iter().filter(|&&v| v).count()
    }

    /// Truncates or pads (with unvoiced frames) to exactly `frames` entries.
    pub fn aligned_to(mut self, frames: usize) -> Self {
        if self.len() != frames {
            log::debug!("Aligning pitch track from {} to {} frames", self.len(), frames);
        }
        self.f0.resize(frames, 0.0);
        self.voiced.resize(frames, false);
        self
    }
}

/// How the ideal frequency of a voiced frame is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionMode {
    /// Snap to the nearest equal-tempered semitone, then blend.
    Snap,
    /// Keep the estimate and only apply humanization jitter.
    HumanizeOnly,
}

#[derive(Clone, Copy, Debug)]
pub struct PitchSettings {
    /// Correction amount, 0 = untouched, 1 = full snap.
    pub strength: f32,
    /// Random deviation amount, scales the +-15 cent range.
    pub humanize_amount: f32,
    pub mode: CorrectionMode,
}

impl PitchSettings {
    pub fn snap(strength: f32, humanize_amount: f32) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            humanize_amount: humanize_amount.clamp(0.0, 1.0),
            mode: CorrectionMode::Snap,
        }
    }

    pub fn humanize(amount: f32) -> Self {
        Self {
            strength: 1.0,
            humanize_amount: amount.clamp(0.0, 1.0),
            mode: CorrectionMode::HumanizeOnly,
        }
    }
}

pub fn hz_to_midi(freq: f32) -> f32 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2.0f32.powf((midi - 69.0) / 12.0)
}

pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0f32.powf(cents / 1200.0)
}

/// Frequency ratio of a uniform random deviation in `[-15a, +15a]` cents.
pub fn humanize_ratio<R: Rng>(amount: f32, rng: &mut R) -> f32 {
    if amount <= 0.0 {
        return 1.0;
    }
    let range = HUMANIZE_MAX_CENTS * amount;
    cents_to_ratio(rng.gen_range(-range..=range))
}

/// Computes the target frequency of every frame of `track`.
pub fn target_track<R: Rng>(track: &PitchTrack, settings: &PitchSettings, rng: &mut R) -> TargetPitchTrack {
    let f0 = track
        .f0
        .iter()
        .zip(track.voiced.iter())
        .map(|(&f, &voiced)| {
            if !voiced || f <= 0.0 {
                return 0.0;
            }
            let ideal = match settings.mode {
                CorrectionMode::Snap => midi_to_hz(hz_to_midi(f).round()),
                CorrectionMode::HumanizeOnly => f,
            };
            let ideal = ideal * humanize_ratio(settings.humanize_amount, rng);
            f + (ideal - f) * settings.strength
        })
        .collect();

    PitchTrack {
        f0,
        voiced: track.voiced.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn track() -> PitchTrack {
        PitchTrack::new(
            vec![0.0, 220.0, 233.0, 452.5, 180.0, 98.7],
            vec![false, true, true, true, false, true],
        )
    }

    #[test]
    fn midi_conversions() {
        assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-5);
        assert!((midi_to_hz(81.0) - 880.0).abs() < 1e-3);
        assert!((midi_to_hz(hz_to_midi(261.63)) - 261.63).abs() < 1e-2);
    }

    #[test]
    fn unvoiced_frames_are_zeroed() {
        let t = track();
        assert_eq!(t.f0[4], 0.0);
        assert_eq!(t.voiced_frames(), 4);
        let t = PitchTrack::from_frequencies(vec![f32::NAN, -1.0, 100.0]);
        assert_eq!(t.voiced, vec![false, false, true]);
        assert_eq!(t.f0, vec![0.0, 0.0, 100.0]);
    }

    #[test]
    fn zero_strength_is_noop() {
        let mut rng = SmallRng::seed_from_u64(7);
        let t = track();
        let target = target_track(&t, &PitchSettings::snap(0.0, 0.0), &mut rng);
        assert_eq!(target, t);
    }

    #[test]
    fn full_strength_snaps_to_semitone() {
        let mut rng = SmallRng::seed_from_u64(7);
        let t = track();
        let target = target_track(&t, &PitchSettings::snap(1.0, 0.0), &mut rng);
        for (&f, &g) in t.f0.iter().zip(target.f0.iter()) {
            if f == 0.0 {
                assert_eq!(g, 0.0);
                continue;
            }
            let expected = midi_to_hz(hz_to_midi(f).round());
            assert!((g - expected).abs() < 1e-3 * expected, "{} -> {}", f, g);
            let midi = hz_to_midi(g);
            assert!((midi - midi.round()).abs() < 1e-3);
        }
    }

    #[test]
    fn half_strength_blends_linearly() {
        let mut rng = SmallRng::seed_from_u64(1);
        let t = PitchTrack::from_frequencies(vec![233.0]);
        let target = target_track(&t, &PitchSettings::snap(0.5, 0.0), &mut rng);
        let ideal = midi_to_hz(hz_to_midi(233.0).round());
        assert!((target.f0[0] - (233.0 + (ideal - 233.0) * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn humanize_stays_within_cents_bound() {
        let mut rng = SmallRng::seed_from_u64(42);
        let t = PitchTrack::from_frequencies(vec![440.0; 500]);
        let target = target_track(&t, &PitchSettings::humanize(1.0), &mut rng);
        let mut moved = false;
        for &g in &target.f0 {
            let cents = 1200.0 * (g / 440.0).log2();
            assert!(cents.abs() <= 15.0 + 1e-3);
            moved |= cents.abs() > 0.1;
        }
        assert!(moved);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let t = track();
        let settings = PitchSettings::snap(0.8, 0.5);
        let a = target_track(&t, &settings, &mut SmallRng::seed_from_u64(3));
        let b = target_track(&t, &settings, &mut SmallRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn alignment_pads_with_unvoiced() {
        let t = PitchTrack::from_frequencies(vec![100.0, 200.0]).aligned_to(4);
        assert_eq!(t.f0, vec![100.0, 200.0, 0.0, 0.0]);
        assert_eq!(t.voiced, vec![true, true, false, false]);
        assert_eq!(t.aligned_to(1).len(), 1);
    }
}
