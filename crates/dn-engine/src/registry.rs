//! Engine availability and construction

use dn_spectral::NoiseProfile;

use crate::adapter::EngineAdapter;
use crate::config::{ConfigMap, EngineConfig};
use crate::demucs::DemucsAdapter;
use crate::error::EngineResult;
use crate::kind::EngineKind;
use crate::rnnoise::RNNoiseAdapter;
use crate::spectral::SpectralGateAdapter;
use crate::toolchain::EngineToolchain;

/// Engines whose external requirements are met
///
/// The spectral gate is always present. Probes run once per call and
/// each is bounded by the capability timeout.
pub fn probe_engines(toolchain: &EngineToolchain) -> Vec<EngineKind> {
    let mut engines = vec![EngineKind::SpectralGate];

    if toolchain.has_rnnoise_filter() {
        engines.push(EngineKind::RNNoise);
    } else {
        log::warn!("RNNoise not available: ffmpeg without arnndn filter");
    }

    if toolchain.has_demucs() {
        engines.push(EngineKind::Demucs);
    } else {
        log::info!("Demucs not available (not installed)");
    }

    log::info!(
        "Available engines: {}",
        engines.iter().map(EngineKind::as_str).collect::<Vec<_>>().join(", ")
    );
    engines
}

/// Build an adapter from a typed config
///
/// `profile` is only meaningful for the spectral gate and is ignored,
/// with a warning, for the other engines.
pub fn build_engine(
    config: EngineConfig,
    toolchain: &EngineToolchain,
    profile: Option<NoiseProfile>,
) -> Box<dyn EngineAdapter> {
    if profile.is_some() && config.kind() != EngineKind::SpectralGate {
        log::warn!("Noise profile ignored by the {} engine", config.kind());
    }
    match config {
        EngineConfig::SpectralGate(c) => {
            Box::new(SpectralGateAdapter::new(c).with_profile(profile))
        }
        EngineConfig::RNNoise(c) => Box::new(RNNoiseAdapter::new(c, toolchain.clone())),
        EngineConfig::Demucs(c) => Box::new(DemucsAdapter::new(c, toolchain.clone())),
    }
}

/// Build an adapter for `kind` from a flat config mapping
pub fn create_engine(
    kind: EngineKind,
    config: &ConfigMap,
    toolchain: &EngineToolchain,
    profile: Option<NoiseProfile>,
) -> EngineResult<Box<dyn EngineAdapter>> {
    let config = EngineConfig::from_mapping(kind, config)?;
    log::debug!("Creating {} engine", kind);
    Ok(build_engine(config, toolchain, profile))
}
