//! Engine selector

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Closed set of noise reduction engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    SpectralGate,
    #[serde(rename = "rnnoise")]
    RNNoise,
    Demucs,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [Self::SpectralGate, Self::RNNoise, Self::Demucs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpectralGate => "spectral_gate",
            Self::RNNoise => "rnnoise",
            Self::Demucs => "demucs",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SpectralGate => "Spectral Gate",
            Self::RNNoise => "RNNoise",
            Self::Demucs => "Demucs",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spectral_gate" => Ok(Self::SpectralGate),
            "rnnoise" => Ok(Self::RNNoise),
            "demucs" => Ok(Self::Demucs),
            other => Err(EngineError::UnknownEngine(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in EngineKind::ALL {
            assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), kind);
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind));
        }
        assert!("noisereduce".parse::<EngineKind>().is_err());
    }
}
