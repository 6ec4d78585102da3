//! Error types for spectral processing

use dn_core::{Cancelled, SignalError};
use thiserror::Error;

/// Spectral processing errors
#[derive(Error, Debug)]
pub enum SpectralError {
    /// FFT plan or transform failure
    #[error("FFT error: {0}")]
    Fft(String),

    /// Two arrays that must agree in shape do not
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// Noise profile failed validation
    #[error("Invalid noise profile: {0}")]
    InvalidProfile(String),

    /// Processing produced NaN or infinity
    #[error("Non-finite value produced during {0}")]
    NonFinite(&'static str),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Result type for spectral operations
pub type SpectralResult<T> = Result<T, SpectralError>;
