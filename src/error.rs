use thiserror::Error;

/// Typed failures raised by the correction core.
///
/// Orchestration code wraps these in `anyhow` with the stage context.
#[derive(Debug, Error)]
pub enum RetuneError {
    #[error("invalid frame configuration: frame_size={frame_size}, hop_size={hop_size} ({reason})")]
    InvalidFrameConfig {
        frame_size: usize,
        hop_size: usize,
        reason: &'static str,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("spectral shape mismatch: expected {expected_bins}x{expected_frames}, got {bins}x{frames}")]
    ShapeMismatch {
        expected_bins: usize,
        expected_frames: usize,
        bins: usize,
        frames: usize,
    },

    #[error("separator did not produce the '{0}' stem")]
    MissingStem(&'static str),

    #[error("{stage} stage failed")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl RetuneError {
    pub fn stage(stage: &'static str, source: anyhow::Error) -> Self {
        RetuneError::Stage { stage, source }
    }
}
