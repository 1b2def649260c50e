use crate::audio::waveform::{mean_square, Waveform};

/// Segments with a mean squared amplitude below this are treated as silence.
pub const SILENCE_THRESHOLD: f32 = 1e-6;

/// A `[start, end)` span of sample frames in the vocal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VocalSegment {
    pub start: usize,
    pub end: usize,
}

impl VocalSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Default)]
pub struct Segmentation {
    pub segments: Vec<VocalSegment>,
    /// Number of intervals dropped as silent.
    pub silent: usize,
}

/// Cuts the vocal at `onsets` (sample frame indices) and keeps the
/// non-silent intervals. `None` treats the whole buffer as one interval.
pub fn extract_segments(vocal: &Waveform, onsets: Option<&[usize]>) -> Segmentation {
    let len = vocal.frames();
    let mut bounds: Vec<usize> = Vec::with_capacity(onsets.map_or(0, |o| o.len()) + 2);
    bounds.push(0);
    if let Some(onsets) = onsets {
        bounds.extend(onsets.iter().copied().filter(|&o| o < len));
    }
    bounds.push(len);
    bounds.sort_unstable();
    bounds.dedup();

    let mut result = Segmentation::default();
    for pair in bounds.windows(2) {
        let segment = VocalSegment {
            start: pair[0],
            end: pair[1],
        };
        if segment.is_empty() {
            continue;
        }
        let slice = &vocal.samples[segment.start * vocal.channels..segment.end * vocal.channels];
        if mean_square(slice) < SILENCE_THRESHOLD {
            result.silent += 1;
        } else {
            result.segments.push(segment);
        }
    }
    result
}
