use crate::audio::waveform::{rms, Waveform};

/// Processed signals at or below this RMS are returned unscaled.
const SILENCE_RMS: f32 = 1e-6;

/// Scales `processed` so its RMS matches `original`.
pub fn normalize(original: &Waveform, processed: Waveform) -> Waveform {
    let target = rms(&original.samples);
    let current = rms(&processed.samples);
    if current <= SILENCE_RMS {
        log::warn!("Processed audio is near-silent (rms={:.2e}), skipping loudness match", current);
        return processed;
    }
    let gain = target / current;
    log::debug!("Loudness match: rms {:.4} -> {:.4} (gain {:.3})", current, target, gain);
    processed.scaled(gain)
}

pub fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_original_rms() {
        let original = Waveform::mono((0..1000).map(|i| (i as f32 * 0.05).sin()).collect(), 8000);
        let processed = Waveform::mono((0..1000).map(|i| 0.1 * (i as f32 * 0.07).cos()).collect(), 8000);
        let out = normalize(&original, processed);
        let ratio = out.rms() / original.rms();
        assert!((ratio - 1.0).abs() < 0.01);
    }

    #[test]
    fn silent_output_left_alone() {
        let original = Waveform::mono(vec![0.5; 100], 8000);
        let processed = Waveform::mono(vec![1e-8; 100], 8000);
        let out = normalize(&original, processed.clone());
        assert_eq!(out, processed);
    }

    #[test]
    fn decibel_conversion() {
        assert!((db_to_gain(6.0) - 1.9953).abs() < 1e-3);
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-1.5) * db_to_gain(6.0) - db_to_gain(4.5)).abs() < 1e-5);
    }
}
