//! Error types for noise reduction engines

use dn_core::{Cancelled, SignalError};
use dn_media::MediaError;
use dn_spectral::SpectralError;
use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Engine name outside the closed set
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// Engine failed its availability probe
    #[error("Engine not available: {0}")]
    Unavailable(String),

    /// Config mapping value has the wrong type
    #[error("Invalid value for '{key}': expected {expected}")]
    InvalidConfigValue { key: String, expected: &'static str },

    /// Config mapping holds NaN or infinity
    #[error("Non-finite value for '{0}'")]
    NonFiniteConfigValue(String),

    /// RNNoise model missing or unset
    #[error("RNNoise model error: {0}")]
    Model(String),

    /// External separation produced nothing usable
    #[error("Source separation failed: {0}")]
    Separation(String),

    #[error("Spectral error: {0}")]
    Spectral(#[from] SpectralError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl EngineError {
    /// True when the error only carries a cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled(_) | Self::Spectral(SpectralError::Cancelled(_))
        )
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
