//! Rough signal-to-noise estimate for job reporting

use dn_core::SignalBuffer;

use crate::profile::NoiseProfile;
use crate::silence::{detect_silence_regions_mono, SilenceOptions};

/// Estimate SNR in dB
///
/// Noise level comes from the profile's mean power when given, else from the
/// first silent region, else from the quietest 10% of samples. Returns
/// infinity when the noise estimate is zero.
pub fn estimate_snr(signal: &SignalBuffer, profile: Option<&NoiseProfile>) -> f64 {
    let mono = signal.to_mono();
    if mono.is_empty() {
        return 0.0;
    }
    let signal_rms = rms(&mono);

    let noise_rms = match profile {
        Some(profile) => profile.mean_power().sqrt(),
        None => {
            let sr = signal.sample_rate();
            let regions = detect_silence_regions_mono(&mono, sr, &SilenceOptions::default());
            match regions.first() {
                Some(&(start, end)) => {
                    let start = ((start * sr as f64) as usize).min(mono.len());
                    let end = ((end * sr as f64) as usize).clamp(start, mono.len());
                    rms(&mono[start..end])
                }
                None => quietest_decile(&mono),
            }
        }
    };

    if noise_rms > 0.0 {
        20.0 * (signal_rms / noise_rms).log10()
    } else {
        f64::INFINITY
    }
}

fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
}

/// Mean absolute value of the lowest 10% of |samples|
fn quietest_decile(samples: &[f64]) -> f64 {
    let mut magnitudes: Vec<f64> = samples.iter().map(|s| s.abs()).collect();
    magnitudes.sort_by(|a, b| a.total_cmp(b));
    let count = (magnitudes.len() / 10).max(1);
    magnitudes[..count].iter().sum::<f64>() / count as f64
}
