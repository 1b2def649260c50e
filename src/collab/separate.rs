use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{SourceSeparator, Stems};
use crate::audio::decode::decode_audio;
use crate::audio::waveform::Waveform;
use crate::encode::wav::write_float;
use crate::error::RetuneError;
use crate::scratch::ScratchDir;

const VOCAL_STEM_NAMES: &[&str] = &["vocals", "vocal"];
const INSTRUMENTAL_STEM_NAMES: &[&str] = &["no_vocals", "instrumental", "accompaniment"];

/// Uses stems that were separated ahead of time.
pub struct StemFiles {
    pub vocals: PathBuf,
    pub instrumental: PathBuf,
}

impl SourceSeparator for StemFiles {
    fn separate(&self, _mix: &Waveform, _scratch: &ScratchDir) -> Result<Stems> {
        Ok(Stems {
            vocals: decode_audio(&self.vocals).context("Failed to load vocal stem")?,
            instrumental: decode_audio(&self.instrumental).context("Failed to load instrumental stem")?,
        })
    }
}

/// Runs an external separation tool on the mix.
///
/// `{input}` in the arguments is replaced by a WAV copy of the mix and
/// `{output}` by a directory the tool must write its stems into. Stems are
/// found by file name (`vocals.*` and `no_vocals.*` / `instrumental.*` /
/// `accompaniment.*`) anywhere below that directory.
pub struct CommandSeparator {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSeparator {
    /// Two-stem demucs invocation.
    pub fn demucs() -> Self {
        Self {
            program: "demucs".to_string(),
            args: ["--two-stems=vocals", "-o", "{output}", "{input}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl SourceSeparator for CommandSeparator {
    fn separate(&self, mix: &Waveform, scratch: &ScratchDir) -> Result<Stems> {
        let input = scratch.join("mix.wav");
        let output = scratch.join("stems");
        write_float(mix, &input)?;
        std::fs::create_dir_all(&output)
            .with_context(|| format!("Failed to create stem dir: {}", output.display()))?;

        let args = self.expand_args(&input, &output);
        log::info!("Running separator: {} {}", self.program, args.join(" "));
        let result = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to spawn separator '{}'", self.program))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("Separator '{}' exited with error:\n{}", self.program, stderr);
        }

        let vocals = find_stem(&output, VOCAL_STEM_NAMES)?.ok_or(RetuneError::MissingStem("vocals"))?;
        let instrumental =
            find_stem(&output, INSTRUMENTAL_STEM_NAMES)?.ok_or(RetuneError::MissingStem("instrumental"))?;

        Ok(Stems {
            vocals: decode_audio(&vocals)?,
            instrumental: decode_audio(&instrumental)?,
        })
    }
}

/// Depth-first search for a file whose stem matches one of `names`.
fn find_stem(dir: &Path, names: &[&str]) -> Result<Option<PathBuf>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read stem dir: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if let Some(found) = find_stem(&path, names)? {
                return Ok(Some(found));
            }
            continue;
        }
        let matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| names.contains(&s.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if matches {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
