use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use super::format::OutputFormat;
use crate::audio::waveform::Waveform;
use crate::collab::AudioEncoder;

/// Samples written to ffmpeg's stdin per write call.
const WRITE_CHUNK: usize = 16384;

/// Returns true when an `ffmpeg` binary can be executed.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encodes by piping raw little-endian f32 PCM into an ffmpeg subprocess.
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    fn args(waveform: &Waveform, format: OutputFormat, path: &Path) -> Result<Vec<String>> {
        let output = path.to_str().context("Output path contains invalid UTF-8")?;
        let mut args = vec![
            "-y".to_string(),
            "-f".into(), "f32le".into(),
            "-ar".into(), waveform.sample_rate.to_string(),
            "-ac".into(), waveform.channels.to_string(),
            "-i".into(), "pipe:0".into(),
        ];
        args.extend(format.ffmpeg_codec_args().iter().map(|s| s.to_string()));
        args.extend(["-f".to_string(), format.extension().to_string()]);
        args.push(output.to_string());
        Ok(args)
    }
}

impl AudioEncoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn supports(&self, _format: OutputFormat) -> bool {
        true
    }

    fn encode(&self, waveform: &Waveform, format: OutputFormat, path: &Path) -> Result<()> {
        let args = Self::args(waveform, format, path)?;

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {} ch @ {}Hz -> {}",
            waveform.channels,
            waveform.sample_rate,
            format
        );

        {
            let stdin = child.stdin.as_mut().context("FFmpeg stdin not available")?;
            let mut bytes = Vec::with_capacity(WRITE_CHUNK * 4);
            for chunk in waveform.samples.chunks(WRITE_CHUNK) {
                bytes.clear();
                for s in chunk {
                    bytes.extend_from_slice(&s.to_le_bytes());
                }
                stdin.write_all(&bytes).context("Failed to write samples to ffmpeg")?;
            }
        }

        // Close stdin to signal EOF
        drop(child.stdin.take());

        let output = child.wait_with_output().context("Failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete: {}", path.display());
        Ok(())
    }
}
