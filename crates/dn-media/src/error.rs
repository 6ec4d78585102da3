//! Error types for media I/O

use std::path::PathBuf;

use thiserror::Error;

/// Media I/O errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No audio track in {}", .0.display())]
    NoAudioTrack(PathBuf),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("{tool} not found or not executable: {reason}")]
    ToolNotFound { tool: String, reason: String },

    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("Expected output missing: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Failed to parse probe output: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("Signal error: {0}")]
    Signal(#[from] dn_core::SignalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;
