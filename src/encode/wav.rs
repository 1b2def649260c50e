use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

use super::format::OutputFormat;
use crate::audio::waveform::Waveform;
use crate::collab::AudioEncoder;

/// 16-bit PCM WAV writer that needs no external tools.
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn name(&self) -> &'static str {
        "hound"
    }

    fn supports(&self, format: OutputFormat) -> bool {
        format == OutputFormat::Wav
    }

    fn encode(&self, waveform: &Waveform, format: OutputFormat, path: &Path) -> Result<()> {
        if !self.supports(format) {
            anyhow::bail!("{} output requires ffmpeg; only wav can be written without it", format);
        }
        write_pcm16(waveform, path)
    }
}

pub fn write_pcm16(waveform: &Waveform, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: waveform.channels as u16,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    for &s in &waveform.samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    log::info!("Wrote {} ({} frames, 16-bit PCM)", path.display(), waveform.frames());
    Ok(())
}

/// Lossless 32-bit float WAV, used for intermediate files.
pub fn write_float(waveform: &Waveform, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: waveform.channels as u16,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    for &s in &waveform.samples {
        writer.write_sample(s)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::ScratchDir;

    #[test]
    fn pcm16_roundtrip() {
        let scratch = ScratchDir::new("wav-test").unwrap();
        let path = scratch.join("out.wav");
        let w = Waveform::new(vec![0.0, 0.5, -0.5, 1.5], 22050, 2);
        WavEncoder.encode(&w, OutputFormat::Wav, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16384, -16384, i16::MAX]);
    }

    #[test]
    fn rejects_compressed_formats() {
        let scratch = ScratchDir::new("wav-test").unwrap();
        let w = Waveform::mono(vec![0.0; 10], 8000);
        assert!(WavEncoder.encode(&w, OutputFormat::Mp3, &scratch.join("x.mp3")).is_err());
        assert!(!WavEncoder.supports(OutputFormat::Flac));
    }

    #[test]
    fn float_wav_is_lossless() {
        let scratch = ScratchDir::new("wav-test").unwrap();
        let path = scratch.join("mix.wav");
        let w = Waveform::mono(vec![0.123, -0.987, 1.5], 44100);
        write_float(&w, &path).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, w.samples);
    }
}
