//! RNNoise adapter (ffmpeg `arnndn` filter)
//!
//! The signal is written to a scratch WAV, filtered by ffmpeg at the
//! configured rate, read back, resampled to the input rate and trimmed or
//! padded to the input length.

use std::path::{Path, PathBuf};

use serde::Serialize;

use dn_core::{report, ProgressFn, SignalBuffer};
use dn_media::{decode_file, resample, write_wav};

use crate::adapter::{conform_to, EngineAdapter};
use crate::config::RNNoiseConfig;
use crate::error::{EngineError, EngineResult};
use crate::kind::EngineKind;
use crate::toolchain::EngineToolchain;

/// RNNoise runs at roughly 5x real time
const REALTIME_FACTOR: f64 = 0.2;
const MODEL_EXTENSION: &str = "rnnn";
/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "bd.rnnn";

/// Models shipped with the RNNoise project: (file, name, description, best for)
const STANDARD_MODELS: &[(&str, &str, &str, &str)] = &[
    (
        "bd.rnnn",
        "Broadband (General Purpose)",
        "General purpose noise reduction model",
        "Mixed content, speech, music",
    ),
    (
        "cb.rnnn",
        "Cassette Tape",
        "Optimized for cassette tape noise",
        "Tape hiss, analog noise",
    ),
    (
        "mp.rnnn",
        "Music Performance",
        "Optimized for musical performances",
        "Live music, concerts, performances",
    ),
    (
        "sh.rnnn",
        "Speech Heavy",
        "Optimized for speech content",
        "Podcasts, interviews, voice recordings",
    ),
];

// ═══════════════════════════════════════════════════════════════════════════════
// MODELS
// ═══════════════════════════════════════════════════════════════════════════════

/// An `.rnnn` model file on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RNNoiseModel {
    pub path: PathBuf,
    pub filename: String,
    pub name: String,
    pub description: String,
    pub best_for: String,
}

impl RNNoiseModel {
    /// Describe any model file, standard or custom
    pub fn describe(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match STANDARD_MODELS.iter().find(|(file, ..)| *file == filename) {
            Some((_, name, description, best_for)) => Self {
                path: path.to_path_buf(),
                filename,
                name: name.to_string(),
                description: description.to_string(),
                best_for: best_for.to_string(),
            },
            None => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Self {
                    path: path.to_path_buf(),
                    filename,
                    name: title_case(&stem.replace('_', " ")),
                    description: "Custom RNNoise model".to_string(),
                    best_for: "Custom application".to_string(),
                }
            }
        }
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Models in `dir`: standard ones first (in fixed order), then custom `*.rnnn` by name
pub fn available_models(dir: &Path) -> Vec<RNNoiseModel> {
    if !dir.is_dir() {
        log::warn!("Models directory not found: {}", dir.display());
        return Vec::new();
    }

    let mut models: Vec<RNNoiseModel> = STANDARD_MODELS
        .iter()
        .map(|(file, ..)| dir.join(file))
        .filter(|path| path.is_file())
        .map(|path| RNNoiseModel::describe(&path))
        .collect();

    let mut custom: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION)
            })
            .filter(|path| {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                !STANDARD_MODELS.iter().any(|(file, ..)| *file == name)
            })
            .collect(),
        Err(e) => {
            log::warn!("Cannot read models directory {}: {}", dir.display(), e);
            Vec::new()
        }
    };
    custom.sort();
    models.extend(custom.iter().map(|path| RNNoiseModel::describe(path)));

    log::info!("Found {} available RNNoise models", models.len());
    models
}

/// Escape a path for use inside an ffmpeg filter argument
fn filter_path_arg(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADAPTER
// ═══════════════════════════════════════════════════════════════════════════════

/// RNNoise through ffmpeg
pub struct RNNoiseAdapter {
    config: RNNoiseConfig,
    toolchain: EngineToolchain,
}

impl RNNoiseAdapter {
    pub fn new(config: RNNoiseConfig, toolchain: EngineToolchain) -> Self {
        Self { config, toolchain }
    }

    pub fn config(&self) -> &RNNoiseConfig {
        &self.config
    }

    /// Model file to run: the configured one, else the broadband model, else the first found
    pub fn resolve_model(&self) -> EngineResult<PathBuf> {
        if let Some(path) = self.config.model_path() {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(EngineError::Model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let models_dir = self.toolchain.models_dir();
        let default = models_dir.join(DEFAULT_MODEL);
        if default.is_file() {
            return Ok(default);
        }
        available_models(models_dir)
            .into_iter()
            .next()
            .map(|model| model.path)
            .ok_or_else(|| EngineError::Model("No RNNoise model specified".to_string()))
    }

    /// Information about the model `process` would use
    pub fn model_info(&self) -> Option<RNNoiseModel> {
        self.resolve_model().ok().map(|path| RNNoiseModel::describe(&path))
    }

    fn mix(&self, processed: &mut SignalBuffer, original: &SignalBuffer) {
        let wet = self.config.mix_factor() as f32;
        let dry = 1.0 - wet;
        for (out, &input) in processed.samples_mut().iter_mut().zip(original.samples()) {
            *out = wet * *out + dry * input;
        }
    }
}

impl EngineAdapter for RNNoiseAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::RNNoise
    }

    fn is_available(&self) -> bool {
        self.toolchain.has_rnnoise_filter()
    }

    fn process(
        &self,
        signal: &SignalBuffer,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> EngineResult<SignalBuffer> {
        let model = self.resolve_model()?;
        report(&mut progress, 0.1, "Preparing audio for RNNoise processing...")?;

        let workspace = self.toolchain.workspace("dn_rnnoise_")?;
        let input_path = workspace.path().join("input.wav");
        let output_path = workspace.path().join("output.wav");

        report(&mut progress, 0.2, "Saving temporary audio file...")?;
        write_wav(signal, &input_path, 32, false)?;

        report(&mut progress, 0.4, "Processing with RNNoise...")?;
        let filter = format!("arnndn=m={}", filter_path_arg(&model));
        self.toolchain.ffmpeg().filter_audio(
            &input_path,
            &output_path,
            &filter,
            Some(self.config.sample_rate()),
            self.toolchain.timeouts().rnnoise(),
        )?;

        report(&mut progress, 0.9, "Loading processed audio...")?;
        let mut processed = decode_file(&output_path, None, None)?;
        if processed.sample_rate() != signal.sample_rate() {
            processed = resample(&processed, signal.sample_rate())?;
        }
        let mut processed = conform_to(processed, signal)?;

        if self.config.mix_factor() < 1.0 {
            report(&mut progress, 0.95, "Applying mix factor...")?;
            self.mix(&mut processed, signal);
        }

        report(&mut progress, 1.0, "RNNoise processing complete")?;
        log::info!("RNNoise processing completed with model {}", model.display());
        Ok(processed)
    }

    fn estimate_processing_time(&self, duration_seconds: f64) -> f64 {
        duration_seconds * REALTIME_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_available_models_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["sh.rnnn", "bd.rnnn", "my_studio_room.rnnn", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"model").unwrap();
        }

        let models = available_models(dir.path());
        let files: Vec<&str> = models.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(files, ["bd.rnnn", "sh.rnnn", "my_studio_room.rnnn"]);
        assert_eq!(models[0].name, "Broadband (General Purpose)");
        assert_eq!(models[2].name, "My Studio Room");
        assert_eq!(models[2].description, "Custom RNNoise model");
    }

    #[test]
    fn test_missing_models_dir() {
        assert!(available_models(Path::new("/nonexistent/models")).is_empty());
    }

    #[test]
    fn test_resolve_model() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = EngineToolchain::default().with_models_dir(dir.path());

        let adapter = RNNoiseAdapter::new(RNNoiseConfig::default(), toolchain.clone());
        assert!(matches!(adapter.resolve_model(), Err(EngineError::Model(_))));

        std::fs::write(dir.path().join("cb.rnnn"), b"model").unwrap();
        assert_eq!(adapter.resolve_model().unwrap(), dir.path().join("cb.rnnn"));

        std::fs::write(dir.path().join(DEFAULT_MODEL), b"model").unwrap();
        assert_eq!(adapter.resolve_model().unwrap(), dir.path().join(DEFAULT_MODEL));

        let missing = RNNoiseConfig::default().with_model_path(Some(dir.path().join("gone.rnnn")));
        let adapter = RNNoiseAdapter::new(missing, toolchain);
        assert!(adapter.resolve_model().is_err());
    }

    #[test]
    fn test_filter_path_escaping() {
        assert_eq!(filter_path_arg(Path::new("/m/bd.rnnn")), "/m/bd.rnnn");
        assert_eq!(filter_path_arg(Path::new("C:\\m\\bd.rnnn")), "C\\:/m/bd.rnnn");
    }

    #[test]
    fn test_mix_factor_blend() {
        let adapter = RNNoiseAdapter::new(
            RNNoiseConfig::default().with_mix_factor(0.25),
            EngineToolchain::default(),
        );
        let original = SignalBuffer::mono(vec![1.0; 4], 48000).unwrap();
        let mut processed = SignalBuffer::mono(vec![0.0; 4], 48000).unwrap();
        adapter.mix(&mut processed, &original);
        assert_relative_eq!(processed.samples()[0], 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_estimate() {
        let adapter = RNNoiseAdapter::new(RNNoiseConfig::default(), EngineToolchain::default());
        assert_relative_eq!(adapter.estimate_processing_time(50.0), 10.0);
    }
}
