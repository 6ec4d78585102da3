//! Demucs adapter (python `demucs.separate` subprocess)
//!
//! Speech is isolated by source separation, then a reduced share of the
//! accompaniment is mixed back according to `noise_reduction_strength`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use dn_core::{report, ProgressFn, SignalBuffer};
use dn_media::{command_line, decode_file, resample, run_checked, write_wav};

use crate::adapter::{conform_to, EngineAdapter};
use crate::config::DemucsConfig;
use crate::error::{EngineError, EngineResult};
use crate::kind::EngineKind;
use crate::toolchain::EngineToolchain;

/// Stems demucs may write, by file stem
pub const STEM_NAMES: &[&str] = &["vocals", "no_vocals", "drums", "bass", "other"];
const INSTRUMENT_STEMS: &[&str] = &["drums", "bass", "other"];
/// Instrument stems are mixed back at most at this level
const INSTRUMENT_CEILING: f32 = 0.3;

/// Separated sources keyed by stem name
pub type Stems = BTreeMap<String, SignalBuffer>;

/// Demucs through python
pub struct DemucsAdapter {
    config: DemucsConfig,
    toolchain: EngineToolchain,
}

impl DemucsAdapter {
    pub fn new(config: DemucsConfig, toolchain: EngineToolchain) -> Self {
        Self { config, toolchain }
    }

    pub fn config(&self) -> &DemucsConfig {
        &self.config
    }

    fn separation_command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(self.toolchain.python());
        cmd.args(["-m", "demucs.separate", "--model"])
            .arg(self.config.model_name())
            .arg("--device")
            .arg(self.config.device())
            .arg("-o")
            .arg(output_dir)
            .arg("--float32");
        // Vocal enhancement separates into vocals and accompaniment only
        if self.config.vocal_enhancement() {
            cmd.args(["--two-stems", "vocals"]);
        }
        if let Some(segment) = self.config.segment_length() {
            cmd.arg("--segment").arg(segment.to_string());
        }
        if self.config.overlap() > 0.0 {
            cmd.arg("--overlap").arg(self.config.overlap().to_string());
        }
        if self.config.jobs() > 1 {
            cmd.arg("--jobs").arg(self.config.jobs().to_string());
        }
        cmd.arg(input);
        cmd
    }

    /// Run separation and load every stem, conformed to `signal`'s shape and rate
    pub fn separate_sources(
        &self,
        signal: &SignalBuffer,
        progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> EngineResult<Stems> {
        report(progress, 0.1, "Preparing audio for Demucs separation...")?;
        let workspace = self.toolchain.workspace("dn_demucs_")?;
        let input_path = workspace.path().join("input.wav");
        let output_dir = workspace.path().join("separated");
        std::fs::create_dir_all(&output_dir)?;
        write_wav(signal, &input_path, 32, false)?;

        report(
            progress,
            0.3,
            &format!("Running Demucs separation with {}...", self.config.model_name()),
        )?;
        let mut cmd = self.separation_command(&input_path, &output_dir);
        log::info!("Running Demucs: {}", command_line(&cmd));
        run_checked(&mut cmd, self.toolchain.timeouts().demucs())?;

        report(progress, 0.9, "Loading separated sources...")?;
        let stem_dir = output_dir.join(self.config.model_name()).join("input");
        if !stem_dir.is_dir() {
            return Err(EngineError::Separation(format!(
                "Demucs output directory not found: {}",
                stem_dir.display()
            )));
        }

        let mut stems = Stems::new();
        for name in STEM_NAMES {
            let path = stem_dir.join(format!("{}.wav", name));
            if !path.is_file() {
                continue;
            }
            let mut stem = decode_file(&path, None, None)?;
            if stem.sample_rate() != signal.sample_rate() {
                stem = resample(&stem, signal.sample_rate())?;
            }
            let stem = conform_to(stem, signal)?;
            log::debug!("Loaded {} source: {:?}", name, stem.shape());
            stems.insert(name.to_string(), stem);
        }
        if stems.is_empty() {
            return Err(EngineError::Separation("no stems produced".to_string()));
        }

        report(progress, 1.0, "Source separation complete")?;
        Ok(stems)
    }

    /// Vocals plus a reduced share of the accompaniment
    ///
    /// With strength `s`, `no_vocals` is mixed back at `1 - s` and each
    /// instrument stem at `0.3 * (1 - s)`. Missing vocals start from silence.
    pub fn recombine(&self, stems: &Stems, reference: &SignalBuffer) -> EngineResult<SignalBuffer> {
        let mut cleaned = match stems.get("vocals") {
            Some(vocals) => vocals.clone(),
            None => reference.expand_like(&vec![0.0; reference.frames()])?,
        };

        let keep = (1.0 - self.config.noise_reduction_strength()) as f32;
        if keep <= 0.0 {
            return Ok(cleaned);
        }

        if let Some(accompaniment) = stems.get("no_vocals") {
            add_scaled(&mut cleaned, accompaniment, keep);
        }
        for name in INSTRUMENT_STEMS {
            if let Some(instrument) = stems.get(*name) {
                add_scaled(&mut cleaned, instrument, INSTRUMENT_CEILING * keep);
            }
        }
        Ok(cleaned)
    }
}

fn add_scaled(target: &mut SignalBuffer, source: &SignalBuffer, gain: f32) {
    for (out, &s) in target.samples_mut().iter_mut().zip(source.samples()) {
        *out += gain * s;
    }
}

impl EngineAdapter for DemucsAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Demucs
    }

    fn is_available(&self) -> bool {
        self.toolchain.has_demucs()
    }

    fn process(
        &self,
        signal: &SignalBuffer,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> EngineResult<SignalBuffer> {
        let stems = self.separate_sources(signal, &mut progress)?;
        let cleaned = self.recombine(&stems, signal)?;
        log::info!("Demucs noise reduction completed");
        Ok(cleaned)
    }

    fn estimate_processing_time(&self, duration_seconds: f64) -> f64 {
        let model = match self.config.model_name() {
            "htdemucs" => 2.0,
            "htdemucs_ft" => 2.5,
            "hdemucs_mmi" => 1.5,
            "mdx_extra" => 0.8,
            _ => 1.5,
        };
        let device = match self.config.device() {
            "cuda" => 0.3,
            "mps" => 0.5,
            _ => 1.0,
        };
        duration_seconds * model * device
    }
}
