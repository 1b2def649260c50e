/// Interleaved floating-point audio with its sample rate and channel count.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Splits interleaved samples into one vector per channel.
    pub fn split_channels(&self) -> Vec<Vec<f32>> {
        (0..self.channels)
            .map(|ch| {
                self.samples
                    .iter()
                    .skip(ch)
                    .step_by(self.channels)
                    .copied()
                    .collect()
            })
            .collect()
    }

    /// Interleaves per-channel vectors, truncating to the shortest channel.
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Self {
        let min_len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let samples = (0..min_len)
            .flat_map(|i| channels.iter().map(move |ch| ch[i]))
            .collect();
        Self::new(samples, sample_rate, channels.len())
    }

    /// Averages all channels into a single one.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Returns a copy with every sample multiplied by `gain`.
    pub fn scaled(&self, gain: f32) -> Self {
        Self {
            samples: self.samples.iter().map(|s| s * gain).collect(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Mean of squared samples.
pub fn mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_merge_channels() {
        let w = Waveform::new(vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 44100, 2);
        let chans = w.split_channels();
        assert_eq!(chans, vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]);
        assert_eq!(Waveform::from_channels(&chans, 44100), w);
        assert_eq!(w.frames(), 3);
    }

    #[test]
    fn mono_downmix_averages() {
        let w = Waveform::new(vec![1.0, 0.0, 0.5, 0.5], 8000, 2);
        assert_eq!(w.to_mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn rms_of_constant() {
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
        assert!((mean_square(&[2.0, 0.0]) - 2.0).abs() < 1e-6);
    }
}
