//! Contracts for the external stages the correction core depends on.
//!
//! The pipeline only sees these traits. Default implementations live in the
//! submodules and in [`crate::encode`].

pub mod beat_file;
pub mod flux;
pub mod mcleod;
pub mod separate;

use anyhow::Result;
use std::path::Path;

use crate::audio::waveform::Waveform;
use crate::dsp::pitch::PitchTrack;
use crate::dsp::stft::SpectralAnalyzer;
use crate::encode::format::OutputFormat;
use crate::rhythm::grid::BeatGrid;
use crate::scratch::ScratchDir;

/// Vocal and accompaniment stems of a mix.
pub struct Stems {
    pub vocals: Waveform,
    pub instrumental: Waveform,
}

pub trait SourceSeparator {
    /// Splits `mix` into stems. Intermediate files must go under `scratch`.
    fn separate(&self, mix: &Waveform, scratch: &ScratchDir) -> Result<Stems>;
}

pub trait BeatTracker {
    /// Beat times of `instrumental`. An empty grid is a valid answer.
    fn track(&self, instrumental: &Waveform) -> Result<BeatGrid>;
}

pub trait OnsetDetector {
    /// Ordered onset positions in sample frames.
    fn detect(&self, vocal: &Waveform) -> Result<Vec<usize>>;
}

pub trait PitchTracker {
    /// One estimate per analysis frame of `analyzer` over `samples`.
    fn track(&self, samples: &[f32], sample_rate: u32, analyzer: &SpectralAnalyzer) -> Result<PitchTrack>;
}

pub trait AudioEncoder {
    fn name(&self) -> &'static str;

    fn supports(&self, format: OutputFormat) -> bool;

    fn encode(&self, waveform: &Waveform, format: OutputFormat, path: &Path) -> Result<()>;
}

/// Everything a pipeline run needs from the outside world, passed explicitly.
pub struct Collaborators {
    pub separator: Box<dyn SourceSeparator>,
    pub beat_tracker: Box<dyn BeatTracker>,
    pub onset_detector: Box<dyn OnsetDetector>,
    pub pitch_tracker: Box<dyn PitchTracker>,
    pub encoder: Box<dyn AudioEncoder>,
}
