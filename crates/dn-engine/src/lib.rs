//! Noise reduction engines
//!
//! Every engine implements [`EngineAdapter`]: a signal goes in, a signal of
//! the same shape comes out, with progress relayed through the callback.
//!
//! | Engine | Backend |
//! |--------|---------|
//! | `spectral_gate` | in-process STFT gating ([`dn_spectral`]) |
//! | `rnnoise` | ffmpeg `arnndn` filter with `.rnnn` models |
//! | `demucs` | `python -m demucs.separate` source separation |
//!
//! Configs are tagged variants ([`EngineConfig`]) that round-trip through a
//! flat [`ConfigMap`].

mod adapter;
mod config;
mod demucs;
mod error;
mod kind;
mod registry;
mod rnnoise;
mod spectral;
mod toolchain;

pub use adapter::EngineAdapter;
pub use config::{
    parse_config_json, ConfigMap, ConfigMapping, ConfigValue, DemucsConfig, EngineConfig,
    RNNoiseConfig,
};
pub use demucs::{DemucsAdapter, Stems, STEM_NAMES};
pub use error::{EngineError, EngineResult};
pub use kind::EngineKind;
pub use registry::{build_engine, create_engine, probe_engines};
pub use rnnoise::{available_models, RNNoiseAdapter, RNNoiseModel, DEFAULT_MODEL};
pub use spectral::SpectralGateAdapter;
pub use toolchain::{EngineToolchain, DEFAULT_MODELS_DIR};

// Re-export for callers that configure the gate directly
pub use dn_spectral::{NoiseProfile, SpectralGateConfig};
