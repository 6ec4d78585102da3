//! External tools shared by the subprocess engines

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use dn_media::{run_with_timeout, Ffmpeg, ToolPaths, ToolTimeouts};

/// Default directory searched for `.rnnn` models
pub const DEFAULT_MODELS_DIR: &str = "models";

/// ffmpeg, python, scratch space and model location
#[derive(Debug, Clone)]
pub struct EngineToolchain {
    ffmpeg: Ffmpeg,
    temp_dir: Option<PathBuf>,
    models_dir: PathBuf,
}

impl Default for EngineToolchain {
    fn default() -> Self {
        Self::new(ToolPaths::default(), ToolTimeouts::default())
    }
}

impl EngineToolchain {
    pub fn new(paths: ToolPaths, timeouts: ToolTimeouts) -> Self {
        Self {
            ffmpeg: Ffmpeg::new(paths, timeouts),
            temp_dir: None,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
        }
    }

    /// Scratch directory for intermediate WAV files (default: system temp)
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn ffmpeg(&self) -> &Ffmpeg {
        &self.ffmpeg
    }

    pub fn timeouts(&self) -> &ToolTimeouts {
        self.ffmpeg.timeouts()
    }

    pub fn python(&self) -> &Path {
        &self.ffmpeg.paths().python
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Fresh scratch directory, removed on drop
    pub fn workspace(&self, prefix: &str) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }

    /// True if ffmpeg was built with the RNNoise filter
    pub fn has_rnnoise_filter(&self) -> bool {
        self.ffmpeg.has_filter("arnndn")
    }

    /// True if the configured python can import demucs
    pub fn has_demucs(&self) -> bool {
        let mut cmd = Command::new(self.python());
        cmd.args(["-c", "import demucs; print('available')"]);
        match run_with_timeout(&mut cmd, self.timeouts().capability()) {
            Ok(output) => output.status.success() && output.stdout_lossy().contains("available"),
            Err(e) => {
                log::debug!("Demucs probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_probe_false() {
        let paths = ToolPaths {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
            python: PathBuf::from("/nonexistent/python"),
        };
        let toolchain = EngineToolchain::new(paths, ToolTimeouts::default());
        assert!(!toolchain.has_rnnoise_filter());
        assert!(!toolchain.has_demucs());
    }

    #[test]
    fn test_workspace_in_temp_dir() {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");
        let toolchain = EngineToolchain::default().with_temp_dir(Some(scratch.clone()));

        let workspace = toolchain.workspace("dn_test_").unwrap();
        assert!(workspace.path().starts_with(&scratch));
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }
}
