use anyhow::Result;

use super::resample::resample;
use crate::audio::waveform::Waveform;
use crate::dsp::loudness::db_to_gain;

/// Vocal gain staging applied before overlaying onto the instrumental.
///
/// The defaults reproduce the historical -1.5 dB / +6 dB pair (net +4.5 dB).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixSettings {
    pub vocal_attenuation_db: f32,
    pub overlay_gain_db: f32,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            vocal_attenuation_db: -1.5,
            overlay_gain_db: 6.0,
        }
    }
}

impl MixSettings {
    pub fn vocal_gain(&self) -> f32 {
        db_to_gain(self.vocal_attenuation_db + self.overlay_gain_db)
    }
}

/// Converts `input` to `channels` channels: mono is duplicated, anything
/// else is averaged and then duplicated.
pub fn match_channels(input: &Waveform, channels: usize) -> Waveform {
    let channels = channels.max(1);
    if input.channels == channels {
        return input.clone();
    }
    let mono = input.to_mono();
    let samples = mono
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels))
        .collect();
    Waveform::new(samples, input.sample_rate, channels)
}

/// Adds the gained vocal onto the instrumental. The result has the
/// instrumental's length, rate and channel layout.
pub fn mixdown(vocal: &Waveform, instrumental: &Waveform, settings: &MixSettings) -> Result<Waveform> {
    let vocal = if vocal.sample_rate != instrumental.sample_rate {
        resample(vocal, instrumental.sample_rate)?
    } else {
        vocal.clone()
    };
    let vocal = match_channels(&vocal, instrumental.channels);
    let gain = settings.vocal_gain();

    let mut samples = instrumental.samples.clone();
    for (out, &v) in samples.iter_mut().zip(vocal.samples.iter()) {
        *out += v * gain;
    }

    if vocal.frames() != instrumental.frames() {
        log::debug!(
            "Mixdown length mismatch: vocal {} frames, instrumental {} frames",
            vocal.frames(),
            instrumental.frames()
        );
    }
    log::info!(
        "Mixdown: vocal gain {:+.1} dB, {} ch @ {}Hz",
        settings.vocal_attenuation_db + settings.overlay_gain_db,
        instrumental.channels,
        instrumental.sample_rate
    );

    Ok(Waveform::new(samples, instrumental.sample_rate, instrumental.channels))
}
