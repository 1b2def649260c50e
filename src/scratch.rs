use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-run temporary directory, removed with its contents on drop.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(label: &str) -> Result<Self> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let name = format!("retune-{}-{}-{}", label, std::process::id(), nanos);
        let path = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create scratch dir: {}", path.display()))?;
        log::debug!("Created scratch dir {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed scratch dir {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("Failed to remove scratch dir {}: {}", self.path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_on_drop() {
        let path = {
            let scratch = ScratchDir::new("test").unwrap();
            std::fs::write(scratch.join("stem.wav"), b"data").unwrap();
            std::fs::create_dir_all(scratch.join("nested")).unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn removed_on_error_path() {
        fn failing(scratch_path: &mut PathBuf) -> Result<()> {
            let scratch = ScratchDir::new("err")?;
            *scratch_path = scratch.path().to_path_buf();
            anyhow::bail!("stage failed")
        }
        let mut path = PathBuf::new();
        assert!(failing(&mut path).is_err());
        assert!(!path.as_os_str().is_empty());
        assert!(!path.exists());
    }
}
