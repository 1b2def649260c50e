use anyhow::{Context, Result};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::audio::waveform::Waveform;

/// Resamples every channel of `input` to `to_rate` using rubato.
pub fn resample(input: &Waveform, to_rate: u32) -> Result<Waveform> {
    if input.sample_rate == to_rate || input.is_empty() {
        return Ok(Waveform::new(input.samples.clone(), to_rate, input.channels));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / input.sample_rate as f64;
    let frames = input.frames();
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        frames,
        input.channels,
    )
    .context("Failed to create resampler")?;

    let channels = input.split_channels();
    let mut output = resampler
        .process(&channels, None)
        .context("Resampling failed")?;

    let expected = (frames as f64 * ratio).round() as usize;
    for ch in output.iter_mut() {
        ch.resize(expected, 0.0);
    }

    log::info!(
        "Resampled {} frames {}Hz -> {} frames {}Hz",
        frames,
        input.sample_rate,
        expected,
        to_rate
    );
    Ok(Waveform::from_channels(&output, to_rate))
}
