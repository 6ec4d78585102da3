//! Statistical spectral gating
//!
//! Stationary mode thresholds each bin at `mean + n_std * std` of the noise
//! clip's dB spectrum. Non-stationary mode compares each bin against its own
//! time-smoothed envelope and maps the excess through a sigmoid. Either mask
//! is blended by `prop_decrease`, smoothed with a triangular kernel, and
//! applied to the complex spectrum.

use ndarray::{Array2, Axis};

use crate::error::SpectralResult;
use crate::smoothing::smooth_mask;
use crate::stft::Stft;

/// Dynamic range kept below each bin's maximum (dB)
const TOP_DB: f64 = 80.0;

/// Statistical gate parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalOptions {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Threshold in standard deviations above the noise mean (stationary)
    pub n_std_thresh: f64,
    /// Mask smoothing extent across frequency (Hz)
    pub freq_mask_smooth_hz: f64,
    /// Mask smoothing extent across time (ms)
    pub time_mask_smooth_ms: f64,
    /// 1.0 removes gated bins completely, 0.0 leaves the signal untouched
    pub prop_decrease: f64,
    pub stationary: bool,
    /// Envelope time constant (non-stationary, seconds)
    pub time_constant_s: f64,
    /// Envelope multiple at the sigmoid midpoint (non-stationary)
    pub thresh_n_mult: f64,
    pub sigmoid_slope: f64,
}

impl Default for StatisticalOptions {
    fn default() -> Self {
        Self {
            n_fft: 1024,
            hop_length: 256,
            n_std_thresh: 1.5,
            freq_mask_smooth_hz: 500.0,
            time_mask_smooth_ms: 50.0,
            prop_decrease: 1.0,
            stationary: true,
            time_constant_s: 2.0,
            thresh_n_mult: 2.0,
            sigmoid_slope: 10.0,
        }
    }
}

/// Magnitude in dB, floored at `TOP_DB` below each row's maximum
fn amp_to_db(magnitude: &Array2<f64>) -> Array2<f64> {
    let mut db = magnitude.mapv(|m| 20.0 * (m + f64::EPSILON).log10());
    for mut row in db.rows_mut() {
        let floor = row.iter().copied().fold(f64::NEG_INFINITY, f64::max) - TOP_DB;
        row.mapv_inplace(|v| v.max(floor));
    }
    db
}

/// Per-bin `mean + n_std * std` of a dB spectrogram
fn stationary_threshold(noise_db: &Array2<f64>, n_std: f64) -> Vec<f64> {
    noise_db
        .rows()
        .into_iter()
        .map(|row| {
            let n = row.len().max(1) as f64;
            let mean = row.sum() / n;
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            mean + n_std * var.sqrt()
        })
        .collect()
}

/// Forward-backward one-pole smoothing along time
fn time_smoothed(magnitude: &Array2<f64>, coefficient: f64) -> Array2<f64> {
    let mut smoothed = magnitude.clone();
    for mut row in smoothed.lanes_mut(Axis(1)) {
        let len = row.len();
        if len == 0 {
            continue;
        }
        let mut state = row[0];
        for i in 0..len {
            state = coefficient * row[i] + (1.0 - coefficient) * state;
            row[i] = state;
        }
        let mut state = row[len - 1];
        for i in (0..len).rev() {
            state = coefficient * row[i] + (1.0 - coefficient) * state;
            row[i] = state;
        }
    }
    smoothed
}

fn sigmoid(x: f64, shift: f64, slope: f64) -> f64 {
    1.0 / (1.0 + (-(x + shift) * slope).exp())
}

/// Gate a mono signal; output has the same length as the input
///
/// Without a noise clip the stationary statistics come from the signal.
pub fn reduce_noise(
    signal: &[f64],
    sample_rate: u32,
    noise_clip: Option<&[f64]>,
    options: &StatisticalOptions,
) -> SpectralResult<Vec<f64>> {
    let stft = Stft::new(options.n_fft, options.hop_length);
    let spectrum = stft.forward(signal)?;
    let magnitude = spectrum.mapv(|c| c.norm());

    let mask = if options.stationary {
        let noise = noise_clip.filter(|clip| !clip.is_empty()).unwrap_or(signal);
        let noise_magnitude = stft.forward(noise)?.mapv(|c| c.norm());
        let threshold = stationary_threshold(&amp_to_db(&noise_magnitude), options.n_std_thresh);

        let mut mask = amp_to_db(&magnitude);
        for (mut row, &thresh) in mask.rows_mut().into_iter().zip(&threshold) {
            row.mapv_inplace(|db| if db > thresh { 1.0 } else { 0.0 });
        }
        mask
    } else {
        let frames = options.time_constant_s * sample_rate as f64 / options.hop_length as f64;
        let coefficient = ((1.0 + 4.0 * frames * frames).sqrt() - 1.0) / (2.0 * frames * frames);
        let envelope = time_smoothed(&magnitude, coefficient.clamp(0.0, 1.0));

        let mut mask = magnitude.clone();
        ndarray::Zip::from(&mut mask).and(&envelope).for_each(|m, &env| {
            let above = (*m - env) / (env + f64::EPSILON);
            *m = sigmoid(above, -options.thresh_n_mult, options.sigmoid_slope);
        });
        mask
    };

    let prop = options.prop_decrease.clamp(0.0, 1.0);
    let mask = mask.mapv(|m| m * prop + (1.0 - prop));

    let bin_hz = sample_rate as f64 / (options.n_fft as f64 / 2.0);
    let frame_ms = options.hop_length as f64 / sample_rate as f64 * 1000.0;
    let n_freq = (options.freq_mask_smooth_hz / bin_hz) as usize;
    let n_time = (options.time_mask_smooth_ms / frame_ms) as usize;
    let mask = smooth_mask(&mask, n_freq, n_time);

    let mut gated = spectrum;
    ndarray::Zip::from(&mut gated).and(&mask).for_each(|c, &m| *c *= m);

    stft.inverse(&gated, signal.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    fn energy(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_stationary_reduces_noise_only_input() {
        let sr = 16000;
        let hiss: Vec<f64> = noise(sr as usize, 1).iter().map(|v| v * 0.05).collect();
        let clip = noise(sr as usize / 2, 2).iter().map(|v| v * 0.05).collect::<Vec<_>>();

        let out = reduce_noise(&hiss, sr, Some(clip.as_slice()), &StatisticalOptions::default()).unwrap();
        assert_eq!(out.len(), hiss.len());
        assert!(energy(&out) < energy(&hiss) * 0.5);
    }

    #[test]
    fn test_prop_zero_without_smoothing_is_identity() {
        let sr = 8000;
        let x: Vec<f64> = noise(4000, 9).iter().map(|v| v * 0.3).collect();
        let options = StatisticalOptions {
            prop_decrease: 0.0,
            freq_mask_smooth_hz: 0.0,
            time_mask_smooth_ms: 0.0,
            ..Default::default()
        };
        let out = reduce_noise(&x, sr, None, &options).unwrap();
        for (a, b) in x.iter().zip(&out) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_nonstationary_keeps_length_and_finite() {
        let sr = 8000;
        let x: Vec<f64> = noise(5000, 4).iter().map(|v| v * 0.2).collect();
        let options = StatisticalOptions {
            stationary: false,
            ..Default::default()
        };
        let out = reduce_noise(&x, sr, None, &options).unwrap();
        assert_eq!(out.len(), x.len());
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_amp_to_db_floor() {
        let m = Array2::from_shape_vec((1, 2), vec![1.0, 0.0]).unwrap();
        let db = amp_to_db(&m);
        assert!((db[[0, 1]] - (db[[0, 0]] - TOP_DB)).abs() < 1e-9);
    }
}
