use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use super::BeatTracker;
use crate::audio::waveform::Waveform;
use crate::rhythm::grid::BeatGrid;

/// Downbeat times within this many seconds of a beat mark that beat.
const DOWNBEAT_TOLERANCE: f64 = 1e-3;

/// Beat annotations produced by an external tracker.
///
/// ```json
/// { "beats": [0.48, 0.96, 1.44], "downbeats": [0.48] }
/// ```
#[derive(Debug, Deserialize)]
pub struct BeatAnnotations {
    pub beats: Vec<f64>,
    #[serde(default)]
    pub downbeats: Vec<f64>,
}

impl BeatAnnotations {
    pub fn into_grid(self) -> BeatGrid {
        let flags = self
            .beats
            .iter()
            .map(|&b| {
                self.downbeats
                    .iter()
                    .any(|&d| (d - b).abs() <= DOWNBEAT_TOLERANCE)
            })
            .collect();
        BeatGrid::new(self.beats, flags)
    }
}

/// Reads a precomputed beat grid instead of analyzing the instrumental.
pub struct BeatFile {
    pub path: PathBuf,
}

impl BeatTracker for BeatFile {
    fn track(&self, _instrumental: &Waveform) -> Result<BeatGrid> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read beat file: {}", self.path.display()))?;
        let annotations: BeatAnnotations = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse beat file: {}", self.path.display()))?;
        let grid = annotations.into_grid();
        log::info!("Loaded {} beats from {}", grid.len(), self.path.display());
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_beats_and_downbeats() {
        let json = r#"{ "beats": [0.5, 1.0, 1.5, 2.0], "downbeats": [0.5, 2.0004] }"#;
        let grid = serde_json::from_str::<BeatAnnotations>(json).unwrap().into_grid();
        assert_eq!(grid.times, vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(grid.downbeats, vec![true, false, false, true]);
    }

    #[test]
    fn downbeats_optional() {
        let grid = serde_json::from_str::<BeatAnnotations>(r#"{ "beats": [1.0] }"#)
            .unwrap()
            .into_grid();
        assert_eq!(grid.downbeats, vec![false]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tracker = BeatFile {
            path: PathBuf::from("/nonexistent/beats.json"),
        };
        assert!(tracker.track(&Waveform::mono(vec![], 44100)).is_err());
    }
}
