//! Onset-driven re-timing of vocal segments onto a subdivided beat grid.

use super::grid::{subdivide, subdivision_factor, BeatGrid, GridPoint};
use super::segment::{extract_segments, VocalSegment};
use crate::audio::waveform::Waveform;

/// Re-timed output quieter than this peak falls back to the original vocal.
const COLLAPSE_PEAK: f32 = 0.01;

#[derive(Clone, Copy, Debug)]
pub struct QuantizeSettings {
    /// Grid resolution in subdivisions per four beats.
    pub quantize_grid: u32,
    /// Fraction of the acceptance threshold credited to downbeats.
    pub strong_beat_bias: f64,
}

/// Picks the grid point closest to `target_time`, giving downbeats a
/// `bias * threshold` head start.
///
/// Returns `None` when the chosen point is not strictly within `threshold`
/// seconds of the target.
pub fn find_best_beat(future: &[GridPoint], target_time: f64, threshold: f64, bias: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for point in future {
        let distance = (point.time - target_time).abs();
        let discount = if point.downbeat { bias * threshold } else { 0.0 };
        let weighted = distance - discount;
        if best.map_or(true, |(w, _)| weighted < w) {
            best = Some((weighted, point.time));
        }
    }

    let (_, time) = best?;
    if (time - target_time).abs() < threshold {
        Some(time)
    } else {
        None
    }
}

/// Where a segment ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub start: usize,
    pub quantized: bool,
}

/// Cursor enforcing that placed segments never overlap.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlacementState {
    pub last_end_sample: usize,
}

impl PlacementState {
    /// Places `segment` at `candidate` when it fits after the cursor and
    /// inside the buffer, otherwise at its original start.
    pub fn place(&mut self, segment: VocalSegment, candidate: Option<usize>, buffer_len: usize) -> Placement {
        let quantized = candidate
            .filter(|&start| start >= self.last_end_sample && start + segment.len() <= buffer_len);
        let start = quantized.unwrap_or(segment.start);
        self.last_end_sample = self.last_end_sample.max(start + segment.len());
        Placement {
            start,
            quantized: quantized.is_some(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuantizeReport {
    pub quantized: usize,
    pub kept: usize,
    pub silent: usize,
}

#[derive(Debug)]
pub enum QuantizeOutcome {
    /// Rhythm correction was not attempted.
    Skipped(&'static str),
    /// The re-timed buffer collapsed to near-silence and was discarded.
    Reverted(QuantizeReport),
    Applied(Waveform, QuantizeReport),
}

/// Moves each onset-bounded segment of `vocal` to the best nearby grid point.
///
/// `onsets` are sample frame indices; `None` means onset detection was
/// unavailable and the whole buffer is treated as one segment.
pub fn quantize_vocal(
    vocal: &Waveform,
    beats: &BeatGrid,
    onsets: Option<&[usize]>,
    settings: &QuantizeSettings,
) -> QuantizeOutcome {
    let Some(mean_interval) = beats.mean_interval() else {
        return QuantizeOutcome::Skipped("fewer than two beats");
    };
    let threshold = mean_interval / 2.0;
    let grid = subdivide(beats, subdivision_factor(settings.quantize_grid));
    log::debug!(
        "Quantize grid: {} points from {} beats, threshold {:.3}s",
        grid.len(),
        beats.len(),
        threshold
    );

    let segmentation = extract_segments(vocal, onsets);
    let sr = vocal.sample_rate as f64;
    let ch = vocal.channels;
    let buffer_len = vocal.frames();

    let mut output = vec![0.0f32; vocal.samples.len()];
    let mut state = PlacementState::default();
    let mut report = QuantizeReport {
        silent: segmentation.silent,
        ..Default::default()
    };

    for segment in &segmentation.segments {
        let target_time = segment.start as f64 / sr;
        let future = grid.from_time(state.last_end_sample as f64 / sr);
        let candidate = find_best_beat(future, target_time, threshold, settings.strong_beat_bias)
            .map(|time| (time * sr).round() as usize);

        let placement = state.place(*segment, candidate, buffer_len);
        if placement.quantized {
            report.quantized += 1;
        } else {
            report.kept += 1;
        }

        let src = &vocal.samples[segment.start * ch..segment.end * ch];
        let dst_start = placement.start * ch;
        let dst_end = (dst_start + src.len()).min(output.len());
        for (out, &s) in output[dst_start..dst_end].iter_mut().zip(src) {
            *out += s;
        }
    }

    let retimed = Waveform::new(output, vocal.sample_rate, ch);
    if retimed.peak() < COLLAPSE_PEAK {
        return QuantizeOutcome::Reverted(report);
    }
    QuantizeOutcome::Applied(retimed, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: f64, downbeat: bool) -> GridPoint {
        GridPoint { time, downbeat }
    }

    #[test]
    fn downbeat_bias_wins_close_call() {
        let future = [point(1.0, false), point(1.02, true), point(1.5, false)];
        assert_eq!(find_best_beat(&future, 1.0, 0.3, 0.1), Some(1.02));
    }

    #[test]
    fn without_bias_closest_wins() {
        let future = [point(1.0, false), point(1.02, true), point(1.5, false)];
        assert_eq!(find_best_beat(&future, 1.0, 0.3, 0.0), Some(1.0));
    }

    #[test]
    fn no_candidate_within_threshold() {
        let future = [point(2.0, false), point(2.5, true)];
        assert_eq!(find_best_beat(&future, 1.0, 0.3, 0.1), None);
        assert_eq!(find_best_beat(&[], 1.0, 0.3, 0.1), None);
    }

    #[test]
    fn bias_cannot_accept_distant_downbeat() {
        // Weighted distance favours the downbeat but its raw distance is too far.
        let future = [point(1.35, false), point(1.31, true)];
        assert_eq!(find_best_beat(&future, 1.0, 0.3, 0.5), None);
    }

    #[test]
    fn overlapping_candidate_is_rejected() {
        let mut state = PlacementState { last_end_sample: 500 };
        let seg = VocalSegment { start: 450, end: 550 };
        let placement = state.place(seg, Some(480), 1000);
        assert_eq!(placement, Placement { start: 450, quantized: false });
        assert_eq!(state.last_end_sample, 550);
    }

    #[test]
    fn cursor_never_moves_backward() {
        let mut state = PlacementState { last_end_sample: 500 };
        let seg = VocalSegment { start: 100, end: 200 };
        state.place(seg, None, 1000);
        assert_eq!(state.last_end_sample, 500);
    }

    #[test]
    fn candidate_past_buffer_is_rejected() {
        let mut state = PlacementState::default();
        let seg = VocalSegment { start: 800, end: 900 };
        let placement = state.place(seg, Some(950), 1000);
        assert_eq!(placement.start, 800);
        assert!(!placement.quantized);
        let placement = state.place(VocalSegment { start: 910, end: 950 }, Some(920), 1000);
        assert_eq!(placement, Placement { start: 920, quantized: true });
        assert_eq!(state.last_end_sample, 960);
    }

    fn click_vocal(sample_rate: u32, len: usize, starts: &[usize], width: usize) -> Waveform {
        let mut samples = vec![0.0f32; len];
        for &s in starts {
            for x in samples.iter_mut().skip(s).take(width) {
                *x = 0.5;
            }
        }
        Waveform::mono(samples, sample_rate)
    }

    #[test]
    fn segments_snap_to_grid() {
        let sr = 1000;
        // Beats every 0.5s; segments start slightly late.
        let beats = BeatGrid::new(vec![0.0, 0.5, 1.0, 1.5, 2.0], vec![true, false, false, false, true]);
        let vocal = click_vocal(sr, 2500, &[520, 1040], 100);
        let settings = QuantizeSettings {
            quantize_grid: 4,
            strong_beat_bias: 0.1,
        };
        let outcome = quantize_vocal(&vocal, &beats, Some(&[520, 620, 1040, 1140]), &settings);
        let QuantizeOutcome::Applied(out, report) = outcome else {
            panic!("expected quantized output");
        };
        assert_eq!(report.quantized, 2);
        assert_eq!(report.kept, 0);
        assert_eq!(out.samples[500], 0.5);
        assert_eq!(out.samples[599], 0.5);
        assert_eq!(out.samples[600], 0.0);
        assert_eq!(out.samples[1000], 0.5);
        assert_eq!(out.samples[1040 + 100 - 1], 0.0);
    }

    #[test]
    fn empty_grid_skips() {
        let vocal = click_vocal(1000, 1000, &[100], 50);
        let settings = QuantizeSettings {
            quantize_grid: 16,
            strong_beat_bias: 0.1,
        };
        assert!(matches!(
            quantize_vocal(&vocal, &BeatGrid::default(), None, &settings),
            QuantizeOutcome::Skipped(_)
        ));
    }

    #[test]
    fn quiet_result_reverts() {
        let beats = BeatGrid::new(vec![0.0, 0.5, 1.0], vec![]);
        let vocal = Waveform::mono(vec![0.005; 1000], 1000);
        let settings = QuantizeSettings {
            quantize_grid: 4,
            strong_beat_bias: 0.1,
        };
        assert!(matches!(
            quantize_vocal(&vocal, &beats, None, &settings),
            QuantizeOutcome::Reverted(_)
        ));
    }
}
