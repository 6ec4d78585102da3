//! External tool locations and time limits

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Executables invoked as subprocesses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub python: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            python: PathBuf::from(if cfg!(windows) { "python" } else { "python3" }),
        }
    }
}

/// Per-operation subprocess limits (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    pub probe: u64,
    pub extract: u64,
    pub convert: u64,
    pub remux: u64,
    pub rnnoise: u64,
    pub demucs: u64,
    /// Capability checks at startup
    pub capability: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe: 30,
            extract: 300,
            convert: 300,
            remux: 600,
            rnnoise: 300,
            demucs: 1800,
            capability: 10,
        }
    }
}

impl ToolTimeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract)
    }

    pub fn convert(&self) -> Duration {
        Duration::from_secs(self.convert)
    }

    pub fn remux(&self) -> Duration {
        Duration::from_secs(self.remux)
    }

    pub fn rnnoise(&self) -> Duration {
        Duration::from_secs(self.rnnoise)
    }

    pub fn demucs(&self) -> Duration {
        Duration::from_secs(self.demucs)
    }

    pub fn capability(&self) -> Duration {
        Duration::from_secs(self.capability)
    }
}
