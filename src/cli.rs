use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::encode::format::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "retune", about = "Vocal pitch and rhythm correction")]
pub struct Cli {
    /// Config file (defaults to retune.toml or ~/.config/retune/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Separate, quantize, pitch-correct and remix a song
    Autotune(AutotuneArgs),
    /// Add subtle random pitch drift to every channel of a recording
    Humanize(HumanizeArgs),
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output audio file
    #[arg(short, long, default_value = "retuned.wav")]
    pub output: PathBuf,

    /// Output format (mp3, wav, flac). Inferred from the output extension if omitted.
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Random seed for humanization jitter
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct AutotuneArgs {
    /// Mixed input song (WAV, MP3, FLAC, OGG)
    #[arg(required_unless_present = "vocals")]
    pub input: Option<PathBuf>,

    /// Pre-separated vocal stem; skips the separator
    #[arg(long, requires = "instrumental")]
    pub vocals: Option<PathBuf>,

    /// Pre-separated instrumental stem
    #[arg(long, requires = "vocals")]
    pub instrumental: Option<PathBuf>,

    /// JSON beat annotations ({"beats": [...], "downbeats": [...]})
    #[arg(long)]
    pub beats: Option<PathBuf>,

    /// Pitch correction amount (0.0-1.0)
    #[arg(short, long)]
    pub strength: Option<f32>,

    /// Humanization amount (0.0-1.0)
    #[arg(long)]
    pub humanize: Option<f32>,

    /// Rhythm grid in subdivisions per four beats (e.g. 16); omit to keep timing
    #[arg(short, long)]
    pub quantize_grid: Option<u32>,

    /// Preference for downbeats when quantizing
    #[arg(long)]
    pub strong_beat_bias: Option<f64>,

    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Args, Debug)]
pub struct HumanizeArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Humanization amount (0.0-1.0)
    #[arg(short, long)]
    pub amount: Option<f32>,

    #[command(flatten)]
    pub out: OutputArgs,
}
