//! Beat grids and their subdivision into quantization points.

/// Times closer than this are treated as the same grid point.
const TIME_EPSILON: f64 = 1e-9;

/// Beat times in seconds with a parallel downbeat flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatGrid {
    pub times: Vec<f64>,
    pub downbeats: Vec<bool>,
}

impl BeatGrid {
    /// Builds a strictly increasing grid; duplicate times merge their flags.
    pub fn new(times: Vec<f64>, downbeats: Vec<bool>) -> Self {
        let mut beats: Vec<GridPoint> = times
            .into_iter()
            .enumerate()
            .filter(|(_, t)| t.is_finite() && *t >= 0.0)
            .map(|(i, time)| GridPoint {
                time,
                downbeat: downbeats.get(i).copied().unwrap_or(false),
            })
            .collect();
        normalize_points(&mut beats);
        Self {
            times: beats.iter().map(|p| p.time).collect(),
            downbeats: beats.iter().map(|p| p.downbeat).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn is_downbeat(&self, i: usize) -> bool {
        self.downbeats.get(i).copied().unwrap_or(false)
    }

    /// Mean spacing between consecutive beats, `None` with fewer than two.
    pub fn mean_interval(&self) -> Option<f64> {
        if self.times.len() < 2 {
            return None;
        }
        let span = self.times[self.times.len() - 1] - self.times[0];
        Some(span / (self.times.len() - 1) as f64)
    }

    pub fn tempo_bpm(&self) -> Option<f64> {
        self.mean_interval()
            .filter(|&i| i > 0.0)
            .map(|i| 60.0 / i)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub time: f64,
    pub downbeat: bool,
}

/// Strictly increasing quantization points derived from a [`BeatGrid`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuantizedGrid {
    pub points: Vec<GridPoint>,
}

impl QuantizedGrid {
    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    /// Points at or after `time`.
    pub fn from_time(&self, time: f64) -> &[GridPoint] {
        let idx = self.points.partition_point(|p| p.time < time - TIME_EPSILON);
        &self.points[idx..]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Points per beat for a grid resolution in subdivisions per four beats
/// (16 = sixteenth notes).
pub fn subdivision_factor(quantize_grid: u32) -> usize {
    (quantize_grid / 4).max(1) as usize
}

/// Inserts `factor` evenly spaced points per beat interval.
///
/// Grids with fewer than two beats are returned without subdivision.
pub fn subdivide(beats: &BeatGrid, factor: usize) -> QuantizedGrid {
    let factor = factor.max(1);
    let mut points: Vec<GridPoint> = Vec::with_capacity(beats.len().saturating_sub(1) * factor + 1);

    if beats.len() < 2 {
        points.extend(beats.times.iter().enumerate().map(|(i, &time)| GridPoint {
            time,
            downbeat: beats.is_downbeat(i),
        }));
        return QuantizedGrid { points };
    }

    for (i, pair) in beats.times.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        let step = (end - start) / factor as f64;
        for j in 0..factor {
            points.push(GridPoint {
                time: start + step * j as f64,
                downbeat: j == 0 && beats.is_downbeat(i),
            });
        }
    }
    let last = beats.len() - 1;
    points.push(GridPoint {
        time: beats.times[last],
        downbeat: beats.is_downbeat(last),
    });

    normalize_points(&mut points);
    QuantizedGrid { points }
}

fn normalize_points(points: &mut Vec<GridPoint>) {
    points.sort_by(|a, b| a.time.total_cmp(&b.time));
    points.dedup_by(|later, earlier| {
        if (later.time - earlier.time).abs() < TIME_EPSILON {
            earlier.downbeat |= later.downbeat;
            true
        } else {
            false
        }
    });
}
