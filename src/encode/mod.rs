pub mod ffmpeg;
pub mod format;
pub mod wav;

use crate::collab::AudioEncoder;

/// Optional tooling found on this machine, probed once at startup.
#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub ffmpeg: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        let caps = Self {
            ffmpeg: ffmpeg::ffmpeg_available(),
        };
        if caps.ffmpeg {
            log::info!("ffmpeg found, all output formats available");
        } else {
            log::warn!("ffmpeg not found, output limited to wav");
        }
        caps
    }

    pub fn encoder(&self) -> Box<dyn AudioEncoder> {
        if self.ffmpeg {
            Box::new(ffmpeg::FfmpegEncoder)
        } else {
            Box::new(wav::WavEncoder)
        }
    }
}
