//! Pipeline configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dn_engine::EngineToolchain;
use dn_media::{DefaultMediaBackend, ToolPaths, ToolTimeouts, DEFAULT_OUTPUT_PATTERN};

use crate::error::{PipelineError, PipelineResult};

/// Settings shared by every job a pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// ffmpeg, ffprobe and python executables
    pub tools: ToolPaths,

    /// Subprocess limits in seconds
    pub timeouts: ToolTimeouts,

    /// Directory for intermediate files (None = system temp)
    pub temp_dir: Option<PathBuf>,

    /// PCM bit depth of saved WAV files (16, 24 or 32)
    pub save_bit_depth: u16,

    /// Peak-normalize on save
    pub normalize_on_save: bool,

    /// Upper bound on jobs run at once by the batch runner
    pub max_parallel_jobs: usize,

    /// Where `.rnnn` models are looked up
    pub rnnoise_models_dir: PathBuf,

    /// Output path pattern for jobs without an explicit output
    pub output_pattern: String,

    /// Put outputs here instead of following the pattern
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            timeouts: ToolTimeouts::default(),
            temp_dir: None,
            save_bit_depth: 16,
            normalize_on_save: true,
            max_parallel_jobs: rayon::current_num_threads(),
            rnnoise_models_dir: PathBuf::from(dn_engine::DEFAULT_MODELS_DIR),
            output_pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
            output_dir: None,
        }
    }
}

impl PipelineConfig {
    /// 24-bit output, two jobs at a time
    pub fn quality() -> Self {
        Self {
            save_bit_depth: 24,
            max_parallel_jobs: 2,
            ..Default::default()
        }
    }

    /// One job at a time
    pub fn sequential() -> Self {
        Self {
            max_parallel_jobs: 1,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Unsupported depths fall back to 16 when the file is written
    pub fn with_save_bit_depth(mut self, bits: u16) -> Self {
        self.save_bit_depth = bits;
        self
    }

    pub fn with_normalize_on_save(mut self, normalize: bool) -> Self {
        self.normalize_on_save = normalize;
        self
    }

    /// Set batch parallelism (minimum 1)
    pub fn with_max_parallel_jobs(mut self, jobs: usize) -> Self {
        self.max_parallel_jobs = jobs.max(1);
        self
    }

    pub fn with_rnnoise_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rnnoise_models_dir = dir.into();
        self
    }

    pub fn with_output_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.output_pattern = pattern.into();
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    /// Check values that cannot be clamped into shape
    pub fn validate(&self) -> PipelineResult<()> {
        if self.output_pattern.trim().is_empty() && self.output_dir.is_none() {
            return Err(PipelineError::InvalidConfig(
                "output_pattern is empty and no output_dir is set".to_string(),
            ));
        }
        if self.max_parallel_jobs == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_parallel_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Read a JSON config; missing keys take their defaults
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// External tools for the subprocess engines
    pub fn toolchain(&self) -> EngineToolchain {
        EngineToolchain::new(self.tools.clone(), self.timeouts)
            .with_temp_dir(self.temp_dir.clone())
            .with_models_dir(self.rnnoise_models_dir.clone())
    }

    /// Production media collaborator
    pub fn media_backend(&self) -> DefaultMediaBackend {
        DefaultMediaBackend::new(self.tools.clone(), self.timeouts, self.temp_dir.clone())
    }
}
