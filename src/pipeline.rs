//! End-to-end correction runs over one file.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::audio::waveform::Waveform;
use crate::collab::Collaborators;
use crate::dsp::loudness::normalize;
use crate::dsp::pitch::{target_track, PitchSettings};
use crate::dsp::stft::SpectralAnalyzer;
use crate::dsp::vocoder;
use crate::encode::format::OutputFormat;
use crate::error::RetuneError;
use crate::mix::mixdown::{mixdown, MixSettings};
use crate::rhythm::quantize::{quantize_vocal, QuantizeOutcome, QuantizeSettings};
use crate::scratch::ScratchDir;

#[derive(Clone, Copy, Debug)]
pub struct FrameParams {
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AutotuneParams {
    pub pitch: PitchSettings,
    /// `None` leaves vocal timing untouched.
    pub rhythm: Option<QuantizeSettings>,
    pub mix: MixSettings,
    pub frames: FrameParams,
    pub format: OutputFormat,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct HumanizeParams {
    pub amount: f32,
    pub frames: FrameParams,
    pub format: OutputFormat,
    pub seed: Option<u64>,
}

pub struct Pipeline<'a> {
    collab: &'a Collaborators,
    progress: ProgressBar,
}

impl<'a> Pipeline<'a> {
    pub fn new(collab: &'a Collaborators) -> Self {
        Self {
            collab,
            progress: ProgressBar::hidden(),
        }
    }

    /// Shows a stage progress bar on stderr.
    pub fn with_progress(mut self) -> Self {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        self.progress = pb;
        self
    }

    fn begin(&self, stages: u64) {
        self.progress.set_length(stages);
        self.progress.set_position(0);
    }

    fn stage(&self, name: &str) {
        self.progress.set_message(name.to_string());
        log::info!("Stage: {}", name);
    }

    fn done(&self) {
        self.progress.inc(1);
    }

    /// Pitch- and rhythm-corrects the vocal of `mix` and writes the remix to
    /// `output`. Nothing is written unless every stage succeeds.
    pub fn autotune(&self, mix: &Waveform, output: &Path, params: &AutotuneParams) -> Result<PathBuf> {
        self.check_encoder(params.format)?;
        let analyzer = SpectralAnalyzer::new(params.frames.frame_size, params.frames.hop_size)?;
        let scratch = ScratchDir::new("autotune")?;
        let mut rng = seeded_rng(params.seed);
        self.begin(6);

        self.stage("separating");
        let stems = self
            .collab
            .separator
            .separate(mix, &scratch)
            .map_err(|e| RetuneError::stage("separation", e))?;
        if stems.vocals.is_empty() {
            return Err(RetuneError::MissingStem("vocals").into());
        }
        if stems.instrumental.is_empty() {
            return Err(RetuneError::MissingStem("instrumental").into());
        }
        self.done();

        self.stage("quantizing rhythm");
        let vocal = match params.rhythm {
            Some(ref settings) => self.correct_rhythm(&stems.vocals, &stems.instrumental, settings),
            None => {
                log::info!("Rhythm correction disabled");
                stems.vocals.clone()
            }
        };
        self.done();

        self.stage("correcting pitch");
        let corrected = self
            .correct_pitch(&vocal, &params.pitch, &analyzer, &mut rng)
            .map_err(|e| RetuneError::stage("pitch", e))?;
        self.done();

        self.stage("matching loudness");
        let corrected = normalize(&stems.vocals, corrected);
        self.done();

        self.stage("mixing");
        let mixed = mixdown(&corrected, &stems.instrumental, &params.mix)
            .map_err(|e| RetuneError::stage("mixdown", e))?;
        self.done();

        self.stage("encoding");
        let path = self.encode(&mixed, params.format, output, &scratch)?;
        self.done();
        self.progress.finish_with_message("done");
        Ok(path)
    }

    /// Applies humanization-only pitch jitter to every channel of `input`.
    pub fn humanize(&self, input: &Waveform, output: &Path, params: &HumanizeParams) -> Result<PathBuf> {
        self.check_encoder(params.format)?;
        let analyzer = SpectralAnalyzer::new(params.frames.frame_size, params.frames.hop_size)?;
        let scratch = ScratchDir::new("humanize")?;
        let mut rng = seeded_rng(params.seed);
        self.begin(3);

        self.stage("humanizing");
        let settings = PitchSettings::humanize(params.amount);
        let processed = self
            .correct_pitch(input, &settings, &analyzer, &mut rng)
            .map_err(|e| RetuneError::stage("humanize", e))?;
        self.done();

        self.stage("matching loudness");
        let processed = normalize(input, processed);
        self.done();

        self.stage("encoding");
        let path = self.encode(&processed, params.format, output, &scratch)?;
        self.done();
        self.progress.finish_with_message("done");
        Ok(path)
    }

    fn check_encoder(&self, format: OutputFormat) -> Result<()> {
        if !self.collab.encoder.supports(format) {
            anyhow::bail!(
                "Encoder '{}' cannot write {} output",
                self.collab.encoder.name(),
                format
            );
        }
        Ok(())
    }

    /// Re-times the vocal onto the instrumental's beat grid. Every failure
    /// here degrades to the unquantized vocal.
    fn correct_rhythm(&self, vocal: &Waveform, instrumental: &Waveform, settings: &QuantizeSettings) -> Waveform {
        let beats = match self.collab.beat_tracker.track(instrumental) {
            Ok(beats) => beats,
            Err(err) => {
                log::warn!("Beat tracking failed, skipping rhythm correction: {:#}", err);
                return vocal.clone();
            }
        };

        let onsets = match self.collab.onset_detector.detect(vocal) {
            Ok(onsets) => Some(onsets),
            Err(err) => {
                log::warn!("Onset detection failed, treating vocal as one segment: {:#}", err);
                None
            }
        };

        match quantize_vocal(vocal, &beats, onsets.as_deref(), settings) {
            QuantizeOutcome::Applied(retimed, report) => {
                log::info!(
                    "Rhythm: {} segments quantized, {} kept, {} silent",
                    report.quantized,
                    report.kept,
                    report.silent
                );
                retimed
            }
            QuantizeOutcome::Reverted(report) => {
                log::warn!(
                    "Quantized vocal collapsed to silence ({} segments), using original timing",
                    report.quantized + report.kept
                );
                vocal.clone()
            }
            QuantizeOutcome::Skipped(reason) => {
                log::warn!("Skipping rhythm correction: {}", reason);
                vocal.clone()
            }
        }
    }

    /// Tracks pitch on the mono downmix, then resynthesizes each channel
    /// toward the shared target track in parallel.
    fn correct_pitch(
        &self,
        vocal: &Waveform,
        settings: &PitchSettings,
        analyzer: &SpectralAnalyzer,
        rng: &mut SmallRng,
    ) -> Result<Waveform> {
        let mono = vocal.to_mono();
        let frames = analyzer.frame_count(mono.len());
        let track = self
            .collab
            .pitch_tracker
            .track(&mono, vocal.sample_rate, analyzer)
            .context("Pitch tracking failed")?
            .aligned_to(frames);
        let target = target_track(&track, settings, rng);

        let channels = vocal.split_channels();
        let corrected = channels
            .par_iter()
            .map(|ch| vocoder::resynthesize(analyzer, ch, &track, &target))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Waveform::from_channels(&corrected, vocal.sample_rate))
    }

    /// Encodes into the scratch dir, then moves the finished file to `output`.
    fn encode(&self, waveform: &Waveform, format: OutputFormat, output: &Path, scratch: &ScratchDir) -> Result<PathBuf> {
        let staging = scratch.join(format!("output.{}", format.extension()));
        self.collab
            .encoder
            .encode(waveform, format, &staging)
            .map_err(|e| RetuneError::stage("encode", e))?;
        persist(&staging, output)?;
        Ok(output.to_path_buf())
    }
}

fn seeded_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}

fn persist(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output dir: {}", parent.display()))?;
    }
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)
            .with_context(|| format!("Failed to write output file: {}", to.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{BeatTracker, OnsetDetector, PitchTracker, SourceSeparator, Stems};
    use crate::dsp::pitch::PitchTrack;
    use crate::encode::wav::WavEncoder;
    use crate::rhythm::grid::BeatGrid;
    use std::f32::consts::PI;

    fn sine(freq: f32, amp: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    struct FixedStems(Option<Stems>);

    impl SourceSeparator for FixedStems {
        fn separate(&self, _mix: &Waveform, _scratch: &ScratchDir) -> Result<Stems> {
            match &self.0 {
                Some(s) => Ok(Stems {
                    vocals: s.vocals.clone(),
                    instrumental: s.instrumental.clone(),
                }),
                None => anyhow::bail!("model unavailable"),
            }
        }
    }

    struct FixedBeats(Option<BeatGrid>);

    impl BeatTracker for FixedBeats {
        fn track(&self, _instrumental: &Waveform) -> Result<BeatGrid> {
            self.0.clone().context("tracker crashed")
        }
    }

    struct NoOnsets;

    impl OnsetDetector for NoOnsets {
        fn detect(&self, _vocal: &Waveform) -> Result<Vec<usize>> {
            anyhow::bail!("onset detector unavailable")
        }
    }

    struct ConstantPitch(Option<f32>);

    impl PitchTracker for ConstantPitch {
        fn track(&self, samples: &[f32], _sample_rate: u32, analyzer: &SpectralAnalyzer) -> Result<PitchTrack> {
            let f = self.0.context("f0 model unavailable")?;
            Ok(PitchTrack::from_frequencies(vec![f; analyzer.frame_count(samples.len())]))
        }
    }

    fn collaborators(stems: Option<Stems>, beats: Option<BeatGrid>, pitch: Option<f32>) -> Collaborators {
        Collaborators {
            separator: Box::new(FixedStems(stems)),
            beat_tracker: Box::new(FixedBeats(beats)),
            onset_detector: Box::new(NoOnsets),
            pitch_tracker: Box::new(ConstantPitch(pitch)),
            encoder: Box::new(WavEncoder),
        }
    }

    fn stems(sr: u32, len: usize) -> Stems {
        Stems {
            vocals: Waveform::mono(sine(220.0, 0.1, sr, len), sr),
            instrumental: Waveform::new(
                sine(110.0, 0.1, sr, len).into_iter().flat_map(|s| [s, -s]).collect(),
                sr,
                2,
            ),
        }
    }

    fn params(strength: f32) -> AutotuneParams {
        AutotuneParams {
            pitch: PitchSettings::snap(strength, 0.0),
            rhythm: None,
            mix: MixSettings::default(),
            frames: FrameParams {
                frame_size: 1024,
                hop_size: 256,
            },
            format: OutputFormat::Wav,
            seed: Some(1),
        }
    }

    fn read_wav(path: &Path) -> Vec<f32> {
        hound::WavReader::open(path)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / i16::MAX as f32)
            .collect()
    }

    #[test]
    fn zero_strength_mix_is_vocal_plus_instrumental() {
        let sr = 16000;
        let stems = stems(sr, 8000);
        let expected_vocal = stems.vocals.samples.clone();
        let expected_inst = stems.instrumental.samples.clone();
        let collab = collaborators(Some(stems), None, Some(220.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("mix.wav");

        let path = Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![], sr), &output, &params(0.0))
            .unwrap();
        let mixed = read_wav(&path);
        let gain = MixSettings::default().vocal_gain();
        assert_eq!(mixed.len(), expected_inst.len());
        for (i, &m) in mixed.iter().enumerate() {
            let expected = expected_inst[i] + expected_vocal[i / 2] * gain;
            assert!((m - expected).abs() < 5e-3, "sample {}: {} vs {}", i, m, expected);
        }
    }

    #[test]
    fn separation_failure_writes_nothing() {
        let collab = collaborators(None, None, Some(220.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("mix.wav");
        let err = Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![0.0; 100], 16000), &output, &params(1.0))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("separation"));
        assert!(!output.exists());
    }

    #[test]
    fn pitch_failure_writes_nothing() {
        let collab = collaborators(Some(stems(16000, 4000)), None, None);
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("mix.wav");
        assert!(Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![], 16000), &output, &params(1.0))
            .is_err());
        assert!(!output.exists());
    }

    #[test]
    fn beat_failure_still_produces_output() {
        let collab = collaborators(Some(stems(16000, 8000)), None, Some(230.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("mix.wav");
        let mut p = params(1.0);
        p.rhythm = Some(QuantizeSettings {
            quantize_grid: 16,
            strong_beat_bias: 0.1,
        });
        let path = Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![], 16000), &output, &p)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rhythm_with_grid_and_failed_onsets() {
        let beats = BeatGrid::new(vec![0.0, 0.25, 0.5], vec![true, false, false]);
        let collab = collaborators(Some(stems(16000, 8000)), Some(beats), Some(220.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("mix.wav");
        let mut p = params(0.5);
        p.rhythm = Some(QuantizeSettings {
            quantize_grid: 8,
            strong_beat_bias: 0.1,
        });
        let path = Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![], 16000), &output, &p)
            .unwrap();
        assert_eq!(read_wav(&path).len(), 16000);
    }

    #[test]
    fn unsupported_format_fails_before_work() {
        let collab = collaborators(Some(stems(16000, 4000)), None, Some(220.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let mut p = params(1.0);
        p.format = OutputFormat::Mp3;
        assert!(Pipeline::new(&collab)
            .autotune(&Waveform::mono(vec![], 16000), &out_dir.join("mix.mp3"), &p)
            .is_err());
    }

    #[test]
    fn humanize_preserves_loudness() {
        let sr = 16000;
        let input = Waveform::new(
            sine(330.0, 0.2, sr, 8000).into_iter().flat_map(|s| [s, 0.5 * s]).collect(),
            sr,
            2,
        );
        let collab = collaborators(None, None, Some(330.0));
        let out_dir = ScratchDir::new("pipeline-test").unwrap();
        let output = out_dir.join("human.wav");
        let params = HumanizeParams {
            amount: 1.0,
            frames: FrameParams {
                frame_size: 1024,
                hop_size: 256,
            },
            format: OutputFormat::Wav,
            seed: Some(5),
        };
        let path = Pipeline::new(&collab).humanize(&input, &output, &params).unwrap();
        let out = read_wav(&path);
        assert_eq!(out.len(), input.samples.len());
        let ratio = crate::audio::waveform::rms(&out) / input.rms();
        assert!((ratio - 1.0).abs() < 0.01, "rms ratio {}", ratio);
    }

    #[test]
    fn zero_strength_resynthesis_is_unchanged() {
        let sr = 16000;
        let vocal = Waveform::mono(sine(220.0, 0.3, sr, 6000), sr);
        let collab = collaborators(None, None, Some(223.0));
        let analyzer = SpectralAnalyzer::new(1024, 256).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        let out = Pipeline::new(&collab)
            .correct_pitch(&vocal, &PitchSettings::snap(0.0, 0.0), &analyzer, &mut rng)
            .unwrap();
        for (a, b) in vocal.samples.iter().zip(out.samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
