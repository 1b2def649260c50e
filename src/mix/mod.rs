pub mod mixdown;
pub mod resample;
