pub mod loudness;
pub mod pitch;
pub mod stft;
pub mod vocoder;
