use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::encode::format::OutputFormat;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub rhythm: RhythmConfig,
    #[serde(default)]
    pub mix: MixConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub separator: SeparatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct PitchConfig {
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default)]
    pub humanize: f32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RhythmConfig {
    /// Subdivisions per four beats; absent disables rhythm correction.
    #[serde(default)]
    pub quantize_grid: Option<u32>,
    #[serde(default = "default_strong_beat_bias")]
    pub strong_beat_bias: f64,
}

#[derive(Debug, Deserialize)]
pub struct MixConfig {
    #[serde(default = "default_vocal_attenuation_db")]
    pub vocal_attenuation_db: f32,
    #[serde(default = "default_overlay_gain_db")]
    pub overlay_gain_db: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Deserialize)]
pub struct SeparatorConfig {
    #[serde(default = "default_separator_program")]
    pub program: String,
    #[serde(default = "default_separator_args")]
    pub args: Vec<String>,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            strength: default_strength(),
            humanize: 0.0,
            frame_size: default_frame_size(),
            hop_size: default_hop_size(),
            seed: None,
        }
    }
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            quantize_grid: None,
            strong_beat_bias: default_strong_beat_bias(),
        }
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            vocal_attenuation_db: default_vocal_attenuation_db(),
            overlay_gain_db: default_overlay_gain_db(),
        }
    }
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            program: default_separator_program(),
            args: default_separator_args(),
        }
    }
}

fn default_strength() -> f32 { 0.8 }
fn default_frame_size() -> usize { 2048 }
fn default_hop_size() -> usize { 512 }
fn default_strong_beat_bias() -> f64 { 0.1 }
fn default_vocal_attenuation_db() -> f32 { -1.5 }
fn default_overlay_gain_db() -> f32 { 6.0 }
fn default_separator_program() -> String { "demucs".into() }
fn default_separator_args() -> Vec<String> {
    ["--two-stems=vocals", "-o", "{output}", "{input}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path, else `retune.toml` in the working directory, else the
/// per-user config file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("retune.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("retune").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("retune").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
