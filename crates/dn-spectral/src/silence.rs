//! Silence detection on framed RMS energy

use dn_core::SignalBuffer;

use crate::stft::{HOP_LENGTH, N_FFT};

/// Amplitude floor for dB conversion
const AMIN: f64 = 1e-5;
/// Frames more than this far below the loudest frame are clamped
const TOP_DB: f64 = 80.0;

/// Silence detection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceOptions {
    /// Shortest region reported (seconds)
    pub min_duration: f64,
    /// Frames below this level relative to the loudest frame are silent (dB)
    pub threshold_db: f64,
    pub frame_length: usize,
    pub hop_length: usize,
}

impl Default for SilenceOptions {
    fn default() -> Self {
        Self {
            min_duration: 0.5,
            threshold_db: -40.0,
            frame_length: N_FFT,
            hop_length: HOP_LENGTH,
        }
    }
}

impl SilenceOptions {
    pub fn with_min_duration(mut self, seconds: f64) -> Self {
        self.min_duration = seconds;
        self
    }

    pub fn with_threshold_db(mut self, db: f64) -> Self {
        self.threshold_db = db;
        self
    }
}

/// RMS of centered, zero-padded frames: `1 + len / hop` values
pub fn frame_rms(mono: &[f64], frame_length: usize, hop_length: usize) -> Vec<f64> {
    let frame_length = frame_length.max(1);
    let hop_length = hop_length.max(1);
    let pad = frame_length / 2;

    let mut squares = vec![0.0; mono.len() + 2 * pad];
    for (dst, &s) in squares[pad..].iter_mut().zip(mono) {
        *dst = s * s;
    }

    let frames = 1 + mono.len() / hop_length;
    (0..frames)
        .map(|t| {
            let start = t * hop_length;
            let end = (start + frame_length).min(squares.len());
            let energy: f64 = squares[start..end].iter().sum();
            (energy / frame_length as f64).sqrt()
        })
        .collect()
}

/// Convert frame RMS to dB relative to the loudest frame
fn rms_to_db(rms: &[f64]) -> Vec<f64> {
    let reference = rms.iter().copied().fold(0.0, f64::max);
    let ref_db = 20.0 * reference.max(AMIN).log10();

    let db: Vec<f64> = rms
        .iter()
        .map(|&r| 20.0 * r.max(AMIN).log10() - ref_db)
        .collect();
    let floor = db.iter().copied().fold(f64::NEG_INFINITY, f64::max) - TOP_DB;
    db.into_iter().map(|v| v.max(floor)).collect()
}

/// Find silent regions in a mono signal
///
/// Returns `(start, end)` pairs in seconds, in temporal order.
pub fn detect_silence_regions_mono(
    mono: &[f64],
    sample_rate: u32,
    options: &SilenceOptions,
) -> Vec<(f64, f64)> {
    let db = rms_to_db(&frame_rms(mono, options.frame_length, options.hop_length));
    let frame_time = |i: usize| (i * options.hop_length) as f64 / sample_rate as f64;

    let mut regions = Vec::new();
    let mut region_start: Option<f64> = None;

    for (i, &level) in db.iter().enumerate() {
        let silent = level < options.threshold_db;
        match (silent, region_start) {
            (true, None) => region_start = Some(frame_time(i)),
            (false, Some(start)) => {
                let end = frame_time(i);
                if end - start >= options.min_duration {
                    regions.push((start, end));
                }
                region_start = None;
            }
            _ => {}
        }
    }

    // Region still open at the end of the signal closes at the last frame
    if let Some(start) = region_start {
        let end = frame_time(db.len().saturating_sub(1));
        if end - start >= options.min_duration {
            regions.push((start, end));
        }
    }

    log::info!("Detected {} silence regions", regions.len());
    regions
}

/// Find silent regions in a signal buffer (downmixed for analysis)
pub fn detect_silence_regions(signal: &SignalBuffer, options: &SilenceOptions) -> Vec<(f64, f64)> {
    detect_silence_regions_mono(&signal.to_mono(), signal.sample_rate(), options)
}

/// Longest region; the earliest wins ties
pub fn longest_region(regions: &[(f64, f64)]) -> Option<(f64, f64)> {
    regions.iter().copied().fold(None, |best, region| match best {
        Some(b) if b.1 - b.0 >= region.1 - region.0 => Some(b),
        _ => Some(region),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic uniform noise in [-1, 1]
    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
            })
            .collect()
    }

    fn quiet_loud_quiet(sample_rate: u32) -> Vec<f64> {
        let len = 3 * sample_rate as usize;
        let n = noise(len, 7);
        (0..len)
            .map(|i| {
                let loud = i >= len / 4 && i < 3 * len / 4;
                let t = i as f64 / sample_rate as f64;
                if loud {
                    0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() + 0.1 * n[i]
                } else {
                    0.1 * n[i]
                }
            })
            .collect()
    }

    #[test]
    fn test_quiet_loud_quiet_regions() {
        let sr = 22050;
        let signal = quiet_loud_quiet(sr);
        let options = SilenceOptions::default()
            .with_threshold_db(-10.0)
            .with_min_duration(0.2);

        let regions = detect_silence_regions_mono(&signal, sr, &options);
        assert!(!regions.is_empty());
        assert!(regions[0].0 < 1.0);
        for pair in regions.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn test_all_zero_signal_has_no_regions() {
        // Every frame equals the reference, so nothing is below threshold
        let regions = detect_silence_regions_mono(&vec![0.0; 44100], 44100, &SilenceOptions::default());
        assert!(regions.is_empty());
    }

    #[test]
    fn test_min_duration_filters_short_gaps() {
        let sr = 8000;
        let mut signal: Vec<f64> = (0..sr as usize * 2)
            .map(|i| 0.5 * (i as f64 * 0.3).sin())
            .collect();
        // 0.1 s gap of silence
        for s in &mut signal[8000..8800] {
            *s = 0.0;
        }
        let options = SilenceOptions::default();
        assert!(detect_silence_regions_mono(&signal, sr, &options).is_empty());
    }

    #[test]
    fn test_frame_rms_count() {
        assert_eq!(frame_rms(&vec![0.0; 1000], 2048, 512).len(), 2);
        assert_eq!(frame_rms(&vec![0.0; 1024], 2048, 512).len(), 3);
    }

    #[test]
    fn test_longest_region_first_wins_ties() {
        let regions = [(0.0, 1.0), (2.0, 3.0), (4.0, 4.5)];
        assert_eq!(longest_region(&regions), Some((0.0, 1.0)));
        assert_eq!(longest_region(&[]), None);
    }
}
