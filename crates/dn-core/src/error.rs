//! Error types for signal buffers

use thiserror::Error;

/// Signal buffer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Channel count must be at least 1")]
    NoChannels,

    #[error("Sample rate must be non-zero")]
    InvalidSampleRate,

    #[error("Interleaved length {len} is not a multiple of {channels} channels")]
    RaggedInterleave { len: usize, channels: usize },

    #[error("Frame count mismatch: expected {expected}, got {actual}")]
    FrameMismatch { expected: usize, actual: usize },
}

/// Result type for signal operations
pub type SignalResult<T> = Result<T, SignalError>;
