mod audio;
mod cli;
mod collab;
mod config;
mod dsp;
mod encode;
mod error;
mod mix;
mod pipeline;
mod rhythm;
mod scratch;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use audio::decode::decode_audio;
use audio::waveform::Waveform;
use cli::{AutotuneArgs, Cli, Command, HumanizeArgs, OutputArgs};
use collab::beat_file::BeatFile;
use collab::flux::{FluxBeatTracker, FluxOnsetDetector};
use collab::mcleod::McLeodTracker;
use collab::separate::{CommandSeparator, StemFiles};
use collab::{BeatTracker, Collaborators, SourceSeparator};
use config::Config;
use dsp::pitch::PitchSettings;
use encode::format::OutputFormat;
use encode::Capabilities;
use mix::mixdown::MixSettings;
use pipeline::{AutotuneParams, FrameParams, HumanizeParams, Pipeline};
use rhythm::quantize::QuantizeSettings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => Config::default(),
        },
        None => Config::default(),
    };

    let caps = Capabilities::detect();

    match cli.command {
        Command::Autotune(args) => run_autotune(args, &cfg, caps),
        Command::Humanize(args) => run_humanize(args, &cfg, caps),
    }
}

fn run_autotune(args: AutotuneArgs, cfg: &Config, caps: Capabilities) -> Result<()> {
    let separator: Box<dyn SourceSeparator> = match (&args.vocals, &args.instrumental) {
        (Some(vocals), Some(instrumental)) => {
            log::info!("Using pre-separated stems");
            Box::new(StemFiles {
                vocals: vocals.clone(),
                instrumental: instrumental.clone(),
            })
        }
        _ => Box::new(CommandSeparator {
            program: cfg.separator.program.clone(),
            args: cfg.separator.args.clone(),
        }),
    };
    let beat_tracker: Box<dyn BeatTracker> = match args.beats {
        Some(ref path) => Box::new(BeatFile { path: path.clone() }),
        None => Box::new(FluxBeatTracker::default()),
    };
    let collab = Collaborators {
        separator,
        beat_tracker,
        onset_detector: Box::new(FluxOnsetDetector::default()),
        pitch_tracker: Box::new(McLeodTracker::default()),
        encoder: caps.encoder(),
    };

    let mix = match (&args.vocals, &args.input) {
        (Some(_), _) => Waveform::mono(Vec::new(), 44100),
        (None, Some(input)) => decode_audio(input).context("Failed to decode input audio")?,
        (None, None) => anyhow::bail!("An input file or --vocals/--instrumental stems are required"),
    };

    let strength = args.strength.unwrap_or(cfg.pitch.strength);
    let humanize = args.humanize.unwrap_or(cfg.pitch.humanize);
    let rhythm = args
        .quantize_grid
        .or(cfg.rhythm.quantize_grid)
        .map(|quantize_grid| QuantizeSettings {
            quantize_grid,
            strong_beat_bias: args.strong_beat_bias.unwrap_or(cfg.rhythm.strong_beat_bias),
        });

    let params = AutotuneParams {
        pitch: PitchSettings::snap(strength, humanize),
        rhythm,
        mix: MixSettings {
            vocal_attenuation_db: cfg.mix.vocal_attenuation_db,
            overlay_gain_db: cfg.mix.overlay_gain_db,
        },
        frames: frame_params(cfg),
        format: resolve_format(&args.out, cfg),
        seed: args.out.seed.or(cfg.pitch.seed),
    };
    log::info!(
        "Autotune: strength {:.2}, humanize {:.2}, grid {}, format {}",
        params.pitch.strength,
        params.pitch.humanize_amount,
        params
            .rhythm
            .map(|r| r.quantize_grid.to_string())
            .unwrap_or_else(|| "off".to_string()),
        params.format
    );

    let path = Pipeline::new(&collab)
        .with_progress()
        .autotune(&mix, &args.out.output, &params)?;
    log::info!("Done: {}", path.display());
    Ok(())
}

fn run_humanize(args: HumanizeArgs, cfg: &Config, caps: Capabilities) -> Result<()> {
    let collab = Collaborators {
        separator: Box::new(CommandSeparator::demucs()),
        beat_tracker: Box::new(FluxBeatTracker::default()),
        onset_detector: Box::new(FluxOnsetDetector::default()),
        pitch_tracker: Box::new(McLeodTracker::default()),
        encoder: caps.encoder(),
    };

    let input = decode_audio(&args.input).context("Failed to decode input audio")?;
    let params = HumanizeParams {
        amount: args.amount.unwrap_or(cfg.pitch.humanize),
        frames: frame_params(cfg),
        format: resolve_format(&args.out, cfg),
        seed: args.out.seed.or(cfg.pitch.seed),
    };
    log::info!("Humanize: amount {:.2}, format {}", params.amount, params.format);

    let path = Pipeline::new(&collab)
        .with_progress()
        .humanize(&input, &args.out.output, &params)?;
    log::info!("Done: {}", path.display());
    Ok(())
}

fn frame_params(cfg: &Config) -> FrameParams {
    FrameParams {
        frame_size: cfg.pitch.frame_size,
        hop_size: cfg.pitch.hop_size,
    }
}

/// CLI flag, then config, then the output file extension, then wav.
fn resolve_format(out: &OutputArgs, cfg: &Config) -> OutputFormat {
    out.format
        .or(cfg.output.format)
        .or_else(|| OutputFormat::from_path(Path::new(&out.output)))
        .unwrap_or(OutputFormat::Wav)
}
