use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::RetuneError;

/// Supported output containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp3,
    Wav,
    Flac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Mp3, OutputFormat::Wav, OutputFormat::Flac];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::Flac => "flac",
        }
    }

    /// ffmpeg codec arguments: 320 kbps MP3, 16-bit PCM WAV, default FLAC.
    pub fn ffmpeg_codec_args(self) -> &'static [&'static str] {
        match self {
            OutputFormat::Mp3 => &["-c:a", "libmp3lame", "-b:a", "320k"],
            OutputFormat::Wav => &["-c:a", "pcm_s16le"],
            OutputFormat::Flac => &["-c:a", "flac"],
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for OutputFormat {
    type Err = RetuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().trim_start_matches('.').to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| RetuneError::InvalidParameter {
                name: "format",
                reason: format!("unsupported output format '{}', expected mp3, wav or flac", s),
            })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
