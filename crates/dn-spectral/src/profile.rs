//! Noise profiles: estimation from silent segments and persistence

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use dn_core::SignalBuffer;

use crate::error::{SpectralError, SpectralResult};
use crate::silence::{detect_silence_regions_mono, longest_region, SilenceOptions};
use crate::stft::{fft_frequencies, Stft};

/// Added to the median before normalizing variance
const CONFIDENCE_EPS: f64 = 1e-8;

// ═══════════════════════════════════════════════════════════════════════════════
// NOISE PROFILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    /// Longest detected silent region
    Auto,
    /// Explicit time range
    Manual,
    /// Loaded from disk
    File,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::File => "file",
        }
    }
}

/// Estimated noise power spectrum
///
/// Immutable after construction; `power_spectrum` and `frequencies` always
/// have equal length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseProfile {
    power_spectrum: Vec<f64>,
    frequencies: Vec<f64>,
    duration: f64,
    source_type: ProfileSource,
    confidence: f64,
}

impl NoiseProfile {
    /// Build a validated profile; confidence is clamped to [0, 1]
    pub fn new(
        power_spectrum: Vec<f64>,
        frequencies: Vec<f64>,
        duration: f64,
        source_type: ProfileSource,
        confidence: f64,
    ) -> SpectralResult<Self> {
        if power_spectrum.len() != frequencies.len() {
            return Err(SpectralError::ShapeMismatch {
                expected: frequencies.len(),
                got: power_spectrum.len(),
            });
        }
        if power_spectrum.is_empty() {
            return Err(SpectralError::InvalidProfile("empty spectrum".into()));
        }
        if power_spectrum.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(SpectralError::InvalidProfile(
                "power spectrum must be finite and non-negative".into(),
            ));
        }
        if frequencies.iter().any(|f| !f.is_finite()) || frequencies.windows(2).any(|w| w[1] < w[0]) {
            return Err(SpectralError::InvalidProfile(
                "frequencies must be finite and increasing".into(),
            ));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(SpectralError::InvalidProfile(format!("bad duration {duration}")));
        }

        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };

        Ok(Self {
            power_spectrum,
            frequencies,
            duration,
            source_type,
            confidence,
        })
    }

    pub fn power_spectrum(&self) -> &[f64] {
        &self.power_spectrum
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Length of the source segment (seconds)
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn source_type(&self) -> ProfileSource {
        self.source_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Mean power across bins
    pub fn mean_power(&self) -> f64 {
        self.power_spectrum.iter().sum::<f64>() / self.power_spectrum.len() as f64
    }

    /// Noise magnitude at each of `target` frequencies
    ///
    /// Power is converted to magnitude and then linearly interpolated;
    /// targets outside the profile's range take the nearest edge value.
    pub fn magnitude_at(&self, target: &[f64]) -> Vec<f64> {
        let magnitude: Vec<f64> = self.power_spectrum.iter().map(|p| p.sqrt()).collect();
        interpolate(target, &self.frequencies, &magnitude)
    }

    /// Write the profile as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> SpectralResult<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        log::info!("Saved noise profile to {}", path.display());
        Ok(())
    }

    /// Read a profile written by [`NoiseProfile::save`]
    ///
    /// Missing `source_type` defaults to `file`, missing `confidence` to 0.
    pub fn load(path: impl AsRef<Path>) -> SpectralResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let stored: StoredProfile = serde_json::from_reader(reader)?;
        let profile = Self::new(
            stored.power_spectrum,
            stored.frequencies,
            stored.duration,
            stored.source_type,
            stored.confidence,
        )?;
        log::info!(
            "Loaded noise profile from {} ({} bins)",
            path.display(),
            profile.power_spectrum.len()
        );
        Ok(profile)
    }
}

/// On-disk shape; validated through [`NoiseProfile::new`]
#[derive(Deserialize)]
struct StoredProfile {
    power_spectrum: Vec<f64>,
    frequencies: Vec<f64>,
    duration: f64,
    #[serde(default = "default_source")]
    source_type: ProfileSource,
    #[serde(default)]
    confidence: f64,
}

fn default_source() -> ProfileSource {
    ProfileSource::File
}

/// Piecewise-linear interpolation with edge clamping
pub fn interpolate(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return vec![0.0; x.len()];
    }
    x.iter()
        .map(|&v| {
            if v <= xp[0] {
                return fp[0];
            }
            if v >= xp[n - 1] {
                return fp[n - 1];
            }
            // First index with xp[i] > v
            let i = xp[..n].partition_point(|&p| p <= v);
            let (x0, x1) = (xp[i - 1], xp[i]);
            let (y0, y1) = (fp[i - 1], fp[i]);
            if x1 == x0 { y1 } else { y0 + (y1 - y0) * (v - x0) / (x1 - x0) }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Median of a slice; even counts average the two middle values
pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Estimate a profile from a mono noise-only segment
///
/// Returns `None` when the segment is shorter than one analysis window.
pub fn profile_from_segment(
    segment: &[f64],
    sample_rate: u32,
    stft: &Stft,
    source_type: ProfileSource,
) -> SpectralResult<Option<NoiseProfile>> {
    if segment.len() < stft.n_fft() {
        log::error!(
            "Noise segment too short: {} samples, need {}",
            segment.len(),
            stft.n_fft()
        );
        return Ok(None);
    }

    let spectrum = stft.forward(segment)?;
    let power = spectrum.mapv(|c| c.norm_sqr());
    let frames = power.ncols() as f64;

    let mut power_spectrum = Vec::with_capacity(power.nrows());
    let mut normalized_variance = 0.0;
    for row in power.rows() {
        let mut values = row.to_vec();
        let mean = values.iter().sum::<f64>() / frames;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / frames;
        let med = median(&mut values);
        normalized_variance += variance / (med + CONFIDENCE_EPS);
        power_spectrum.push(med);
    }
    normalized_variance /= power.nrows() as f64;
    let confidence = (1.0 - normalized_variance).clamp(0.0, 1.0);

    let duration = segment.len() as f64 / sample_rate as f64;
    let profile = NoiseProfile::new(
        power_spectrum,
        fft_frequencies(sample_rate, stft.n_fft()),
        duration,
        source_type,
        confidence,
    )?;

    log::info!(
        "Extracted {} noise profile: {:.2}s, confidence {:.2}",
        source_type.as_str(),
        duration,
        profile.confidence()
    );
    Ok(Some(profile))
}

/// Profile from an explicit time range
///
/// `None` if the range is negative, reversed, empty or past the end.
pub fn extract_manual_profile(
    signal: &SignalBuffer,
    start_time: f64,
    end_time: f64,
    stft: &Stft,
) -> SpectralResult<Option<NoiseProfile>> {
    let duration = signal.duration();
    if !start_time.is_finite() || !end_time.is_finite() {
        log::error!("Invalid noise range: non-finite bounds");
        return Ok(None);
    }
    if start_time < 0.0 || end_time > duration || start_time >= end_time {
        log::error!(
            "Invalid noise range {:.3}-{:.3}s for {:.3}s signal",
            start_time,
            end_time,
            duration
        );
        return Ok(None);
    }

    let sr = signal.sample_rate() as f64;
    let start = (start_time * sr) as usize;
    let end = ((end_time * sr) as usize).min(signal.frames());
    let mono = signal.slice_frames(start, end).to_mono();
    profile_from_segment(&mono, signal.sample_rate(), stft, ProfileSource::Manual)
}

/// Profile from the longest silent region
pub fn extract_auto_profile(
    signal: &SignalBuffer,
    stft: &Stft,
) -> SpectralResult<Option<NoiseProfile>> {
    let mono = signal.to_mono();
    let regions = detect_silence_regions_mono(&mono, signal.sample_rate(), &SilenceOptions::default());
    let Some((start_time, end_time)) = longest_region(&regions) else {
        log::warn!("No silent region found for automatic noise profile");
        return Ok(None);
    };

    let sr = signal.sample_rate() as f64;
    let start = ((start_time * sr) as usize).min(mono.len());
    let end = ((end_time * sr) as usize).clamp(start, mono.len());
    profile_from_segment(&mono[start..end], signal.sample_rate(), stft, ProfileSource::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::stft::{HOP_LENGTH, N_FFT};

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0) as f32
            })
            .collect()
    }

    fn sample_profile() -> NoiseProfile {
        NoiseProfile::new(
            vec![0.1, 0.25, 1.0 / 3.0],
            vec![0.0, 100.0, 200.0],
            0.75,
            ProfileSource::Auto,
            0.42,
        )
        .unwrap()
    }

    #[test]
    fn test_manual_profile_duration() {
        let sr = 16000;
        let signal = SignalBuffer::mono(noise(sr as usize * 2, 3), sr).unwrap();
        let stft = Stft::new(N_FFT, HOP_LENGTH);

        let profile = extract_manual_profile(&signal, 0.0, 0.5, &stft).unwrap().unwrap();
        assert_relative_eq!(profile.duration(), 0.5, max_relative = 0.1);
        assert_eq!(profile.source_type(), ProfileSource::Manual);
        assert_eq!(profile.power_spectrum().len(), N_FFT / 2 + 1);
        assert!((0.0..=1.0).contains(&profile.confidence()));
    }

    #[test]
    fn test_manual_profile_rejects_bad_ranges() {
        let sr = 16000;
        let signal = SignalBuffer::mono(noise(sr as usize, 5), sr).unwrap();
        let stft = Stft::new(N_FFT, HOP_LENGTH);

        assert!(extract_manual_profile(&signal, 0.5, 0.5, &stft).unwrap().is_none());
        assert!(extract_manual_profile(&signal, 0.6, 0.2, &stft).unwrap().is_none());
        assert!(extract_manual_profile(&signal, 0.0, 1.5, &stft).unwrap().is_none());
        assert!(extract_manual_profile(&signal, -0.1, 0.5, &stft).unwrap().is_none());
    }

    #[test]
    fn test_short_segment_yields_none() {
        let stft = Stft::new(N_FFT, HOP_LENGTH);
        let result = profile_from_segment(&[0.0; 100], 16000, &stft, ProfileSource::Manual).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_auto_profile_uses_silence() {
        let sr = 16000;
        let len = sr as usize * 3;
        let n = noise(len, 11);
        let samples: Vec<f32> = (0..len)
            .map(|i| {
                let t = i as f32 / sr as f32;
                if i < len / 3 {
                    0.001 * n[i]
                } else {
                    0.8 * (2.0 * std::f32::consts::PI * 300.0 * t).sin()
                }
            })
            .collect();
        let signal = SignalBuffer::mono(samples, sr).unwrap();
        let profile = extract_auto_profile(&signal, &Stft::new(N_FFT, HOP_LENGTH))
            .unwrap()
            .unwrap();
        assert_eq!(profile.source_type(), ProfileSource::Auto);
        assert!(profile.duration() >= 0.5);
    }

    #[test]
    fn test_auto_profile_none_without_silence() {
        let sr = 16000;
        let samples: Vec<f32> = (0..sr as usize * 2).map(|i| 0.5 * (i as f32 * 0.2).sin()).collect();
        let signal = SignalBuffer::mono(samples, sr).unwrap();
        assert!(extract_auto_profile(&signal, &Stft::new(N_FFT, HOP_LENGTH)).unwrap().is_none());
    }

    #[test]
    fn test_profile_validation() {
        assert!(NoiseProfile::new(vec![1.0], vec![0.0, 1.0], 1.0, ProfileSource::Auto, 0.5).is_err());
        assert!(NoiseProfile::new(vec![-1.0], vec![0.0], 1.0, ProfileSource::Auto, 0.5).is_err());
        assert!(NoiseProfile::new(vec![1.0, 1.0], vec![2.0, 1.0], 1.0, ProfileSource::Auto, 0.5).is_err());

        let clamped = NoiseProfile::new(vec![1.0], vec![0.0], 1.0, ProfileSource::Auto, 3.0).unwrap();
        assert_eq!(clamped.confidence(), 1.0);
    }

    #[test]
    fn test_save_load_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.json");
        let profile = sample_profile();

        profile.save(&path).unwrap();
        let loaded = NoiseProfile::load(&path).unwrap();
        assert_eq!(loaded, profile);
        for (a, b) in loaded.power_spectrum().iter().zip(profile.power_spectrum()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_load_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(&path, r#"{"power_spectrum":[1.0],"frequencies":[0.0],"duration":2.0}"#).unwrap();

        let loaded = NoiseProfile::load(&path).unwrap();
        assert_eq!(loaded.source_type(), ProfileSource::File);
        assert_eq!(loaded.confidence(), 0.0);
    }

    #[test]
    fn test_interpolate_clamps_edges() {
        let y = interpolate(&[-5.0, 50.0, 150.0, 500.0], &[0.0, 100.0, 200.0], &[1.0, 3.0, 5.0]);
        assert_eq!(y, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut [5.0, 1.0, 3.0]), 3.0);
    }
}
