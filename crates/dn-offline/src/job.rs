//! Processing job definitions
//!
//! A [`ProcessingJob`] carries what to do (input, engine, output settings)
//! and, once run, what happened (stage, progress, timing, results). Only the
//! pipeline moves a job between stages; once a job reaches a terminal stage
//! its state no longer changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dn_engine::{ConfigMap, EngineKind};
use dn_media::is_video_file;

/// Unique job identifier
pub type JobId = u64;

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Default loudness target (EBU R128)
pub const DEFAULT_TARGET_LUFS: f64 = -23.0;

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a job is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    #[default]
    Idle,
    Validating,
    Loading,
    ExtractingAudio,
    NoiseReduction,
    PostProcessing,
    Saving,
    Remuxing,
    Complete,
    Error,
    Cancelled,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Loading => "loading",
            Self::ExtractingAudio => "extracting_audio",
            Self::NoiseReduction => "noise_reduction",
            Self::PostProcessing => "post_processing",
            Self::Saving => "saving",
            Self::Remuxing => "remuxing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Complete, Error or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB
// ═══════════════════════════════════════════════════════════════════════════════

/// One file to clean
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Unique job ID
    pub id: JobId,

    /// Input media file
    pub input_path: PathBuf,

    /// Output file (None = derived from the pipeline's output pattern)
    pub output_path: Option<PathBuf>,

    /// Noise reduction engine
    pub engine: EngineKind,

    /// Flat engine settings, interpreted by the engine
    pub engine_config: ConfigMap,

    /// Output audio format (`wav`, `mp3`, `flac`, `aac`)
    pub output_format: String,

    /// Working sample rate (None = keep original)
    pub sample_rate: Option<u32>,

    /// Put the cleaned audio back into the video container
    pub preserve_video: bool,

    /// Normalize loudness before saving
    pub normalize_loudness: bool,

    /// Loudness target in LUFS
    pub target_lufs: f64,

    // ─── state ───
    stage: ProcessingStage,
    progress: f64,
    message: String,
    error_message: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,

    // ─── results ───
    /// Input duration in seconds
    pub original_duration: Option<f64>,
    /// Output duration in seconds
    pub processed_duration: Option<f64>,
    /// dB
    pub estimated_snr_before: Option<f64>,
    /// dB
    pub estimated_snr_after: Option<f64>,
}

impl ProcessingJob {
    /// Job with default settings
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            id: JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            input_path: input_path.into(),
            output_path: None,
            engine: EngineKind::SpectralGate,
            engine_config: ConfigMap::new(),
            output_format: "wav".to_string(),
            sample_rate: None,
            preserve_video: true,
            normalize_loudness: false,
            target_lufs: DEFAULT_TARGET_LUFS,
            stage: ProcessingStage::Idle,
            progress: 0.0,
            message: String::new(),
            error_message: None,
            start_time: None,
            end_time: None,
            original_duration: None,
            processed_duration: None,
            estimated_snr_before: None,
            estimated_snr_after: None,
        }
    }

    /// Create new job builder
    pub fn builder(input_path: impl Into<PathBuf>) -> JobBuilder {
        JobBuilder {
            job: Self::new(input_path),
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Fraction done, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Set only when the job ended in [`ProcessingStage::Error`]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Wall time in seconds, once the job has ended
    pub fn processing_time(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// True in any terminal stage
    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_video(&self) -> bool {
        is_video_file(&self.input_path)
    }

    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    // ─── transitions (pipeline only) ───

    pub(crate) fn begin(&mut self) {
        self.stage = ProcessingStage::Validating;
        self.progress = 0.0;
        self.message = "Starting processing...".to_string();
        self.error_message = None;
        self.start_time = Some(Utc::now());
        self.end_time = None;
    }

    /// Move to `stage`; progress never goes backwards
    pub(crate) fn enter(&mut self, stage: ProcessingStage, progress: f64, message: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = stage;
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        self.message = message.into();
    }

    pub(crate) fn update(&mut self, progress: f64, message: impl Into<String>) {
        self.enter(self.stage, progress, message);
    }

    pub(crate) fn set_message(&mut self, message: impl Into<String>) {
        if !self.stage.is_terminal() {
            self.message = message.into();
        }
    }

    pub(crate) fn set_output_path(&mut self, path: &Path) {
        if !self.stage.is_terminal() {
            self.output_path = Some(path.to_path_buf());
        }
    }

    pub(crate) fn complete(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        self.enter(ProcessingStage::Complete, 1.0, "Processing complete");
        self.end_time = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = ProcessingStage::Error;
        self.message = format!("Error: {}", error);
        self.error_message = Some(error);
        self.end_time = Some(Utc::now());
    }

    pub(crate) fn cancel(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = ProcessingStage::Cancelled;
        self.message = "Processing cancelled".to_string();
        self.end_time = Some(Utc::now());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Job builder for fluent API
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: ProcessingJob,
}

impl JobBuilder {
    /// Set output file
    pub fn output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.job.output_path = Some(path.into());
        self
    }

    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.job.engine = engine;
        self
    }

    /// Set flat engine settings
    pub fn engine_config(mut self, config: ConfigMap) -> Self {
        self.job.engine_config = config;
        self
    }

    /// Set output format (stored lowercase, without a leading dot)
    pub fn format(mut self, format: &str) -> Self {
        self.job.output_format = format.trim_start_matches('.').to_ascii_lowercase();
        self
    }

    pub fn sample_rate(mut self, rate: Option<u32>) -> Self {
        self.job.sample_rate = rate;
        self
    }

    pub fn preserve_video(mut self, preserve: bool) -> Self {
        self.job.preserve_video = preserve;
        self
    }

    /// Enable loudness normalization to `target_lufs`
    pub fn normalize_loudness(mut self, target_lufs: f64) -> Self {
        self.job.normalize_loudness = true;
        self.job.target_lufs = target_lufs;
        self
    }

    pub fn build(self) -> ProcessingJob {
        self.job
    }
}
