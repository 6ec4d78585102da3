//! Centered short-time Fourier transform with overlap-add inverse
//!
//! Frames are centered: the signal is zero-padded by `n_fft / 2` on both
//! sides, giving `1 + len / hop` frames. The inverse divides by the summed
//! squared window so an unmodified spectrum reconstructs the input.

use std::sync::Arc;

use ndarray::Array2;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::error::{SpectralError, SpectralResult};

/// Default analysis window for spectral subtraction and silence framing
pub const N_FFT: usize = 2048;
/// Default hop between frames
pub const HOP_LENGTH: usize = 512;

/// Complex spectrogram, indexed `[bin, frame]`
pub type Spectrogram = Array2<Complex<f64>>;

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Center frequency in Hz of each of the `n_fft / 2 + 1` bins
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    let bins = n_fft / 2 + 1;
    (0..bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect()
}

/// STFT/ISTFT pair with cached FFT plans
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl Stft {
    /// Create a transform with Hann window of `n_fft` samples
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let n_fft = n_fft.max(2);
        let mut planner = RealFftPlanner::<f64>::new();
        Self {
            n_fft,
            hop: hop.max(1),
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Number of frequency bins per frame
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop
    }

    /// Forward transform of a mono signal
    pub fn forward(&self, signal: &[f64]) -> SpectralResult<Spectrogram> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let frames = self.frame_count(signal.len());
        let mut spectrum = Spectrogram::zeros((self.n_bins(), frames));

        let mut input = self.forward.make_input_vec();
        let mut output = self.forward.make_output_vec();

        for t in 0..frames {
            let start = t * self.hop;
            for (i, sample) in input.iter_mut().enumerate() {
                *sample = padded[start + i] * self.window[i];
            }
            self.forward
                .process(&mut input, &mut output)
                .map_err(|e| SpectralError::Fft(e.to_string()))?;
            for (k, value) in output.iter().enumerate() {
                spectrum[[k, t]] = *value;
            }
        }

        Ok(spectrum)
    }

    /// Inverse transform, trimmed or zero-padded to exactly `length` samples
    pub fn inverse(&self, spectrum: &Spectrogram, length: usize) -> SpectralResult<Vec<f64>> {
        let (bins, frames) = spectrum.dim();
        if bins != self.n_bins() {
            return Err(SpectralError::ShapeMismatch {
                expected: self.n_bins(),
                got: bins,
            });
        }

        let total = self.n_fft + self.hop * frames.saturating_sub(1);
        let mut output = vec![0.0; total];
        let mut window_sum = vec![0.0; total];

        let mut input = self.inverse.make_input_vec();
        let mut frame = self.inverse.make_output_vec();
        let scale = 1.0 / self.n_fft as f64;

        for t in 0..frames {
            for (k, value) in input.iter_mut().enumerate() {
                *value = spectrum[[k, t]];
            }
            // A real signal has purely real DC and Nyquist bins
            input[0].im = 0.0;
            if let Some(last) = input.last_mut() {
                last.im = 0.0;
            }
            self.inverse
                .process(&mut input, &mut frame)
                .map_err(|e| SpectralError::Fft(e.to_string()))?;

            let start = t * self.hop;
            for (i, &sample) in frame.iter().enumerate() {
                let w = self.window[i];
                output[start + i] += sample * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &norm) in output.iter_mut().zip(&window_sum) {
            if norm > f64::MIN_POSITIVE {
                *sample /= norm;
            }
        }

        let pad = self.n_fft / 2;
        let mut result: Vec<f64> = output.into_iter().skip(pad).take(length).collect();
        result.resize(length, 0.0);
        Ok(result)
    }
}

/// Split a spectrogram into magnitude and phase
pub fn magnitude_phase(spectrum: &Spectrogram) -> (Array2<f64>, Array2<f64>) {
    (spectrum.mapv(|c| c.norm()), spectrum.mapv(|c| c.arg()))
}
