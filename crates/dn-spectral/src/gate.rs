//! Spectral gate engine
//!
//! Two reduction paths share one entry point:
//!
//! - **Subtraction**: per-bin over-subtraction against a noise magnitude
//!   estimate with a spectral floor, then optional gain smoothing. Used for
//!   aggressive (> 30 dB) or non-stationary reduction.
//! - **Statistical**: threshold gating from noise statistics. Used for
//!   moderate stationary reduction.
//!
//! Both analyse the mono downmix and duplicate the result across the input's
//! channels, so output shape always matches input shape.

use ndarray::{Array2, Axis, Zip};
use rustfft::num_complex::Complex;

use dn_core::{report, ProgressFn, SignalBuffer};

use crate::config::SpectralGateConfig;
use crate::error::{SpectralError, SpectralResult};
use crate::profile::{extract_auto_profile, extract_manual_profile, median, NoiseProfile};
use crate::smoothing::{moving_average, moving_average_axis};
use crate::statistical::{reduce_noise, StatisticalOptions};
use crate::stft::{fft_frequencies, magnitude_phase, Spectrogram, Stft, HOP_LENGTH, N_FFT};

/// Minimum gain per bin after subtraction
pub const SPECTRAL_FLOOR: f64 = 0.1;
/// Share of lowest-energy frames used for the blind noise estimate (percent)
const QUIET_FRAME_PERCENTILE: f64 = 20.0;
/// Longest excerpt handed to the statistical path as a noise clip (seconds)
const MAX_NOISE_CLIP_SECONDS: f64 = 2.0;
const MAGNITUDE_EPS: f64 = 1e-8;

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless spectral gate
///
/// Noise profiles are passed in explicitly; the engine never caches one, so
/// a single instance can serve any number of signals.
pub struct SpectralGateEngine {
    config: SpectralGateConfig,
    stft: Stft,
}

impl SpectralGateEngine {
    pub fn new(config: SpectralGateConfig) -> Self {
        Self {
            config,
            stft: Stft::new(N_FFT, HOP_LENGTH),
        }
    }

    pub fn config(&self) -> &SpectralGateConfig {
        &self.config
    }

    /// Estimate a noise profile
    ///
    /// With both times set the profile comes from exactly that range (and is
    /// `None` if the range is invalid). Otherwise the longest silent region
    /// of at least 0.5 s is used.
    pub fn create_noise_profile(
        &self,
        signal: &SignalBuffer,
        start_time: Option<f64>,
        end_time: Option<f64>,
    ) -> SpectralResult<Option<NoiseProfile>> {
        match start_time.zip(end_time) {
            Some((start, end)) => extract_manual_profile(signal, start, end, &self.stft),
            None => extract_auto_profile(signal, &self.stft),
        }
    }

    /// Reduce noise in `signal`
    ///
    /// When `profile` is `None` and profiles are enabled, one is estimated
    /// from the configured range or from detected silence first.
    pub fn process(
        &self,
        signal: &SignalBuffer,
        profile: Option<&NoiseProfile>,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> SpectralResult<SignalBuffer> {
        if signal.is_empty() {
            report(&mut progress, 1.0, "Nothing to process")?;
            return Ok(signal.clone());
        }

        let estimated;
        let profile = match profile {
            Some(profile) => Some(profile),
            None if self.config.use_noise_profile() => {
                estimated = self.create_noise_profile(
                    signal,
                    self.config.noise_start_time(),
                    self.config.noise_end_time(),
                )?;
                estimated.as_ref()
            }
            None => None,
        };

        if self.config.uses_subtraction() {
            log::debug!(
                "Spectral subtraction: {:.1} dB, stationary={}",
                self.config.reduction_db(),
                self.config.stationary()
            );
            self.reduce_by_subtraction(signal, profile, &mut progress)
        } else {
            log::debug!(
                "Statistical gating: prop_decrease={:.2}",
                self.config.prop_decrease()
            );
            let profile = profile.filter(|_| self.config.use_noise_profile());
            self.reduce_statistically(signal, profile, &mut progress)
        }
    }

    // ─── Subtraction path ───────────────────────────────────────────────────

    fn reduce_by_subtraction(
        &self,
        signal: &SignalBuffer,
        profile: Option<&NoiseProfile>,
        progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> SpectralResult<SignalBuffer> {
        report(progress, 0.1, "Initializing spectral subtraction")?;
        let mono = signal.to_mono();

        report(progress, 0.3, "Computing STFT")?;
        let spectrum = self.stft.forward(&mono)?;
        let (magnitude, phase) = magnitude_phase(&spectrum);

        report(progress, 0.5, "Estimating noise spectrum")?;
        let noise = match profile {
            Some(profile) => {
                profile.magnitude_at(&fft_frequencies(signal.sample_rate(), self.stft.n_fft()))
            }
            None => estimate_noise_magnitude(&magnitude),
        };

        report(progress, 0.7, "Applying spectral subtraction")?;
        let gain = self.subtraction_gain(&magnitude, &noise);

        let mut processed = Spectrogram::zeros(magnitude.dim());
        Zip::from(&mut processed)
            .and(&magnitude)
            .and(&gain)
            .and(&phase)
            .for_each(|out, &mag, &g, &ph| *out = Complex::from_polar(mag * g, ph));

        report(progress, 0.9, "Reconstructing audio")?;
        let restored = self.stft.inverse(&processed, mono.len())?;
        if restored.iter().any(|v| !v.is_finite()) {
            return Err(SpectralError::NonFinite("spectral subtraction"));
        }

        let output = signal.expand_like(&restored)?;
        report(progress, 1.0, "Spectral subtraction complete")?;
        Ok(output)
    }

    /// Gain matrix `[bin, frame]` with floor and optional smoothing
    fn subtraction_gain(&self, magnitude: &Array2<f64>, noise: &[f64]) -> Array2<f64> {
        let alpha = 10f64.powf(self.config.reduction_db() / 20.0);
        let mut gain = magnitude.clone();
        for (mut row, &noise_mag) in gain.rows_mut().into_iter().zip(noise) {
            row.mapv_inplace(|mag| {
                (1.0 - alpha * noise_mag / (mag + MAGNITUDE_EPS)).max(SPECTRAL_FLOOR)
            });
        }

        let (bins, frames) = gain.dim();
        if self.config.frequency_smoothing() > 0.0 {
            let width = kernel_width(bins, self.config.frequency_smoothing() * 0.1);
            moving_average_axis(&mut gain, Axis(0), width);
        }
        if self.config.time_smoothing() > 0.0 {
            let width = kernel_width(frames, self.config.time_smoothing() * 0.05);
            moving_average_axis(&mut gain, Axis(1), width);
        }
        gain
    }

    // ─── Statistical path ───────────────────────────────────────────────────

    fn reduce_statistically(
        &self,
        signal: &SignalBuffer,
        profile: Option<&NoiseProfile>,
        progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> SpectralResult<SignalBuffer> {
        report(progress, 0.1, "Initializing noise reduction")?;
        let mono = signal.to_mono();
        let sample_rate = signal.sample_rate();

        let options = StatisticalOptions {
            prop_decrease: self.config.prop_decrease(),
            stationary: self.config.stationary(),
            ..Default::default()
        };

        report(progress, 0.3, "Applying noise reduction")?;
        // The noise clip always starts at the top of the signal, wherever the
        // profile itself was measured
        let noise_clip = profile.map(|p| {
            let seconds = p.duration().min(MAX_NOISE_CLIP_SECONDS);
            let len = ((seconds * sample_rate as f64) as usize).min(mono.len());
            &mono[..len]
        });
        let reduced = reduce_noise(&mono, sample_rate, noise_clip, &options)?;
        if reduced.iter().any(|v| !v.is_finite()) {
            return Err(SpectralError::NonFinite("statistical gating"));
        }

        report(progress, 0.8, "Post-processing")?;
        let mut output = signal.expand_like(&reduced)?;

        let ts = self.config.time_smoothing();
        if ts > 0.0 || self.config.frequency_smoothing() > 0.0 {
            let width = (ts * sample_rate as f64 * 0.01).round() as usize;
            if width > 1 {
                for ch in 0..output.channels() {
                    let channel: Vec<f64> = output.channel(ch).iter().map(|&s| s as f64).collect();
                    let smoothed: Vec<f32> =
                        moving_average(&channel, width).into_iter().map(|s| s as f32).collect();
                    output.set_channel(ch, &smoothed);
                }
            }
        }

        report(progress, 1.0, "Noise reduction complete")?;
        Ok(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// `max(1, round(len * fraction))`
fn kernel_width(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).round() as usize).max(1)
}

/// Percentile with linear interpolation between order statistics
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Blind noise magnitude: per-bin median over the quietest frames
fn estimate_noise_magnitude(magnitude: &Array2<f64>) -> Vec<f64> {
    let energy: Vec<f64> = magnitude
        .columns()
        .into_iter()
        .map(|col| col.iter().map(|m| m * m).sum())
        .collect();
    let threshold = percentile(&energy, QUIET_FRAME_PERCENTILE);
    let mut quiet: Vec<usize> = (0..energy.len()).filter(|&t| energy[t] <= threshold).collect();
    if quiet.is_empty() {
        quiet = (0..energy.len()).collect();
    }

    magnitude
        .rows()
        .into_iter()
        .map(|row| {
            let mut values: Vec<f64> = quiet.iter().map(|&t| row[t]).collect();
            median(&mut values)
        })
        .collect()
}
