//! Engine configuration variants and their flat key/value form
//!
//! Every config converts to and from a [`ConfigMap`] of scalar values. The
//! map is what jobs carry, what the CLI parses from JSON and what crosses
//! process boundaries. Converting back clamps out-of-range numbers exactly
//! as the typed setters do; a value of the wrong type is an error.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dn_spectral::{bounded, SpectralGateConfig};

use crate::error::{EngineError, EngineResult};
use crate::kind::EngineKind;

// ═══════════════════════════════════════════════════════════════════════════════
// FLAT MAPPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Scalar config value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Flat string-keyed engine configuration
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Parse a JSON object of scalars into a [`ConfigMap`]
pub fn parse_config_json(json: &str) -> EngineResult<ConfigMap> {
    Ok(serde_json::from_str(json)?)
}

/// Conversion between a typed config and its flat mapping
pub trait ConfigMapping: Sized {
    /// Keys this config reads and writes
    const KEYS: &'static [&'static str];

    fn to_mapping(&self) -> ConfigMap;

    /// Build from a mapping; missing keys take defaults
    fn from_mapping(map: &ConfigMap) -> EngineResult<Self>;
}

fn warn_unknown_keys(map: &ConfigMap, known: &[&str], owner: &str) {
    for key in map.keys().filter(|k| !known.contains(&k.as_str())) {
        log::warn!("Ignoring unknown {} config key: {}", owner, key);
    }
}

fn opt_f64(map: &ConfigMap, key: &str) -> EngineResult<Option<f64>> {
    let value = match map.get(key) {
        None | Some(ConfigValue::Null) => return Ok(None),
        Some(ConfigValue::Float(v)) => *v,
        Some(ConfigValue::Int(v)) => *v as f64,
        Some(_) => {
            return Err(EngineError::InvalidConfigValue {
                key: key.to_string(),
                expected: "number",
            });
        }
    };
    if value.is_finite() {
        Ok(Some(value))
    } else {
        Err(EngineError::NonFiniteConfigValue(key.to_string()))
    }
}

fn f64_or(map: &ConfigMap, key: &str, default: f64) -> EngineResult<f64> {
    Ok(opt_f64(map, key)?.unwrap_or(default))
}

fn int_or(map: &ConfigMap, key: &str, default: i64) -> EngineResult<i64> {
    match map.get(key) {
        None | Some(ConfigValue::Null) => Ok(default),
        Some(ConfigValue::Int(v)) => Ok(*v),
        Some(ConfigValue::Float(v)) if v.is_finite() && v.fract() == 0.0 => Ok(*v as i64),
        Some(_) => Err(EngineError::InvalidConfigValue {
            key: key.to_string(),
            expected: "integer",
        }),
    }
}

fn bool_or(map: &ConfigMap, key: &str, default: bool) -> EngineResult<bool> {
    match map.get(key) {
        None | Some(ConfigValue::Null) => Ok(default),
        Some(ConfigValue::Bool(v)) => Ok(*v),
        Some(_) => Err(EngineError::InvalidConfigValue {
            key: key.to_string(),
            expected: "bool",
        }),
    }
}

fn opt_string(map: &ConfigMap, key: &str) -> EngineResult<Option<String>> {
    match map.get(key) {
        None | Some(ConfigValue::Null) => Ok(None),
        Some(ConfigValue::Str(v)) => Ok(Some(v.clone())),
        Some(_) => Err(EngineError::InvalidConfigValue {
            key: key.to_string(),
            expected: "string",
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECTRAL GATE
// ═══════════════════════════════════════════════════════════════════════════════

impl ConfigMapping for SpectralGateConfig {
    const KEYS: &'static [&'static str] = &[
        "reduction_db",
        "time_smoothing",
        "frequency_smoothing",
        "stationary",
        "prop_decrease",
        "use_noise_profile",
        "noise_start_time",
        "noise_end_time",
    ];

    fn to_mapping(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("reduction_db".into(), self.reduction_db().into());
        map.insert("time_smoothing".into(), self.time_smoothing().into());
        map.insert("frequency_smoothing".into(), self.frequency_smoothing().into());
        map.insert("stationary".into(), self.stationary().into());
        map.insert("prop_decrease".into(), self.prop_decrease().into());
        map.insert("use_noise_profile".into(), self.use_noise_profile().into());
        map.insert("noise_start_time".into(), self.noise_start_time().into());
        map.insert("noise_end_time".into(), self.noise_end_time().into());
        map
    }

    fn from_mapping(map: &ConfigMap) -> EngineResult<Self> {
        warn_unknown_keys(map, Self::KEYS, "spectral gate");
        let defaults = SpectralGateConfig::default();
        Ok(SpectralGateConfig::default()
            .with_reduction_db(f64_or(map, "reduction_db", defaults.reduction_db())?)
            .with_time_smoothing(f64_or(map, "time_smoothing", defaults.time_smoothing())?)
            .with_frequency_smoothing(f64_or(
                map,
                "frequency_smoothing",
                defaults.frequency_smoothing(),
            )?)
            .with_stationary(bool_or(map, "stationary", defaults.stationary())?)
            .with_prop_decrease(f64_or(map, "prop_decrease", defaults.prop_decrease())?)
            .with_use_noise_profile(bool_or(map, "use_noise_profile", defaults.use_noise_profile())?)
            .with_noise_range(
                opt_f64(map, "noise_start_time")?,
                opt_f64(map, "noise_end_time")?,
            ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RNNOISE
// ═══════════════════════════════════════════════════════════════════════════════

/// RNNoise settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RNNoiseConfig {
    model_path: Option<PathBuf>,
    mix_factor: f64,
    sample_rate: u32,
}

impl Default for RNNoiseConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            mix_factor: 1.0,
            sample_rate: 48000,
        }
    }
}

impl RNNoiseConfig {
    /// Processing rates accepted for the filter pass
    pub const SAMPLE_RATE_RANGE: (u32, u32) = (8000, 192000);

    /// `.rnnn` model file; `None` picks the broadband model from the models directory
    pub fn with_model_path(mut self, path: Option<PathBuf>) -> Self {
        self.model_path = path;
        self
    }

    /// Blend of processed (1.0) and original (0.0) signal
    pub fn with_mix_factor(mut self, mix: f64) -> Self {
        self.mix_factor = bounded(mix, 0.0, 1.0);
        self
    }

    /// Rate the filter runs at; RNNoise is trained on 48 kHz
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        let (lo, hi) = Self::SAMPLE_RATE_RANGE;
        self.sample_rate = rate.clamp(lo, hi);
        self
    }

    pub fn model_path(&self) -> Option<&PathBuf> {
        self.model_path.as_ref()
    }

    pub fn mix_factor(&self) -> f64 {
        self.mix_factor
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl ConfigMapping for RNNoiseConfig {
    const KEYS: &'static [&'static str] = &["model_path", "mix_factor", "sample_rate"];

    fn to_mapping(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        let model = self.model_path.as_ref().map(|p| p.to_string_lossy().into_owned());
        map.insert("model_path".into(), ConfigValue::from(model.as_deref()));
        map.insert("mix_factor".into(), self.mix_factor.into());
        map.insert("sample_rate".into(), i64::from(self.sample_rate).into());
        map
    }

    fn from_mapping(map: &ConfigMap) -> EngineResult<Self> {
        warn_unknown_keys(map, Self::KEYS, "RNNoise");
        let defaults = Self::default();
        let rate = int_or(map, "sample_rate", i64::from(defaults.sample_rate))?;
        let (lo, hi) = Self::SAMPLE_RATE_RANGE;
        Ok(Self::default()
            .with_model_path(opt_string(map, "model_path")?.map(PathBuf::from))
            .with_mix_factor(f64_or(map, "mix_factor", defaults.mix_factor)?)
            .with_sample_rate(rate.clamp(i64::from(lo), i64::from(hi)) as u32))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEMUCS
// ═══════════════════════════════════════════════════════════════════════════════

/// Demucs separation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemucsConfig {
    model_name: String,
    device: String,
    segment_length: Option<f64>,
    overlap: f64,
    jobs: u32,
    vocal_enhancement: bool,
    noise_reduction_strength: f64,
}

impl Default for DemucsConfig {
    fn default() -> Self {
        Self {
            model_name: "htdemucs".to_string(),
            device: "cpu".to_string(),
            segment_length: None,
            overlap: 0.25,
            jobs: 1,
            vocal_enhancement: true,
            noise_reduction_strength: 0.8,
        }
    }
}

impl DemucsConfig {
    /// Pretrained model (`htdemucs`, `htdemucs_ft`, `hdemucs_mmi`, `mdx_extra`)
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Torch device (`cpu`, `cuda`, `mps`)
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Segment length in seconds; non-positive means automatic
    pub fn with_segment_length(mut self, seconds: Option<f64>) -> Self {
        self.segment_length = seconds.filter(|s| *s > 0.0);
        self
    }

    /// Segment overlap, [0, 0.5]
    pub fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = bounded(overlap, 0.0, 0.5);
        self
    }

    /// Parallel jobs, at least 1
    pub fn with_jobs(mut self, jobs: u32) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_vocal_enhancement(mut self, enabled: bool) -> Self {
        self.vocal_enhancement = enabled;
        self
    }

    /// How much of the accompaniment is removed, [0, 1]
    pub fn with_noise_reduction_strength(mut self, strength: f64) -> Self {
        self.noise_reduction_strength = bounded(strength, 0.0, 1.0);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn segment_length(&self) -> Option<f64> {
        self.segment_length
    }

    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    pub fn jobs(&self) -> u32 {
        self.jobs
    }

    pub fn vocal_enhancement(&self) -> bool {
        self.vocal_enhancement
    }

    pub fn noise_reduction_strength(&self) -> f64 {
        self.noise_reduction_strength
    }
}

impl ConfigMapping for DemucsConfig {
    const KEYS: &'static [&'static str] = &[
        "model_name",
        "device",
        "segment_length",
        "overlap",
        "jobs",
        "vocal_enhancement",
        "noise_reduction_strength",
    ];

    fn to_mapping(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("model_name".into(), self.model_name.as_str().into());
        map.insert("device".into(), self.device.as_str().into());
        map.insert("segment_length".into(), self.segment_length.into());
        map.insert("overlap".into(), self.overlap.into());
        map.insert("jobs".into(), i64::from(self.jobs).into());
        map.insert("vocal_enhancement".into(), self.vocal_enhancement.into());
        map.insert(
            "noise_reduction_strength".into(),
            self.noise_reduction_strength.into(),
        );
        map
    }

    fn from_mapping(map: &ConfigMap) -> EngineResult<Self> {
        warn_unknown_keys(map, Self::KEYS, "Demucs");
        let defaults = Self::default();
        let jobs = int_or(map, "jobs", i64::from(defaults.jobs))?.clamp(1, i64::from(u32::MAX));
        Ok(Self::default()
            .with_model_name(opt_string(map, "model_name")?.unwrap_or(defaults.model_name))
            .with_device(opt_string(map, "device")?.unwrap_or(defaults.device))
            .with_segment_length(opt_f64(map, "segment_length")?)
            .with_overlap(f64_or(map, "overlap", defaults.overlap)?)
            .with_jobs(jobs as u32)
            .with_vocal_enhancement(bool_or(map, "vocal_enhancement", defaults.vocal_enhancement)?)
            .with_noise_reduction_strength(f64_or(
                map,
                "noise_reduction_strength",
                defaults.noise_reduction_strength,
            )?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAGGED CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for one engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineConfig {
    SpectralGate(SpectralGateConfig),
    RNNoise(RNNoiseConfig),
    Demucs(DemucsConfig),
}

impl EngineConfig {
    /// Defaults for `kind`
    pub fn default_for(kind: EngineKind) -> Self {
        match kind {
            EngineKind::SpectralGate => Self::SpectralGate(SpectralGateConfig::default()),
            EngineKind::RNNoise => Self::RNNoise(RNNoiseConfig::default()),
            EngineKind::Demucs => Self::Demucs(DemucsConfig::default()),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Self::SpectralGate(_) => EngineKind::SpectralGate,
            Self::RNNoise(_) => EngineKind::RNNoise,
            Self::Demucs(_) => EngineKind::Demucs,
        }
    }

    pub fn to_mapping(&self) -> ConfigMap {
        match self {
            Self::SpectralGate(c) => c.to_mapping(),
            Self::RNNoise(c) => c.to_mapping(),
            Self::Demucs(c) => c.to_mapping(),
        }
    }

    /// Typed config for `kind` from a flat mapping
    pub fn from_mapping(kind: EngineKind, map: &ConfigMap) -> EngineResult<Self> {
        Ok(match kind {
            EngineKind::SpectralGate => Self::SpectralGate(SpectralGateConfig::from_mapping(map)?),
            EngineKind::RNNoise => Self::RNNoise(RNNoiseConfig::from_mapping(map)?),
            EngineKind::Demucs => Self::Demucs(DemucsConfig::from_mapping(map)?),
        })
    }
}
