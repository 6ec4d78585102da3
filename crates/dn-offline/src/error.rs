//! Error types for job processing

use std::path::PathBuf;

use thiserror::Error;

use dn_core::Cancelled;
use dn_engine::{EngineError, EngineKind};
use dn_media::MediaError;

/// Job processing errors
///
/// `Display` text is what ends up in a failed job's `error_message`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Input path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Engine not available: {0}")]
    EngineUnavailable(EngineKind),

    #[error("Could not read media file: {}: {source}", path.display())]
    MediaInfo {
        path: PathBuf,
        #[source]
        source: MediaError,
    },

    #[error("No audio track found in: {}", .0.display())]
    NoAudioTrack(PathBuf),

    #[error("Failed to load audio from: {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: MediaError,
    },

    #[error("Failed to save audio file {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: MediaError,
    },

    #[error("Video remuxing failed: {0}")]
    Remux(#[source] MediaError),

    #[error("Audio format conversion failed: {format}: {source}")]
    Conversion {
        format: String,
        #[source]
        source: MediaError,
    },

    #[error("Loudness measurement failed: {0}")]
    Loudness(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Engine(EngineError),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        PipelineError::Cancelled
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        // An engine stopped by the progress relay is a cancellation, not a failure
        if err.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::Engine(err)
        }
    }
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
