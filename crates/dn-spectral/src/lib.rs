//! Spectral noise reduction
//!
//! - [`SpectralGateEngine`]: STFT subtraction and statistical gating
//! - [`NoiseProfile`]: estimated noise power spectrum, persisted as JSON
//! - [`detect_silence_regions`]: quiet-region finder feeding profile extraction
//! - [`estimate_snr`]: before/after SNR for job reports

mod config;
mod error;
mod gate;
mod profile;
mod silence;
mod smoothing;
mod snr;
mod statistical;
mod stft;

pub use config::{bounded, SpectralGateConfig};
pub use error::{SpectralError, SpectralResult};
pub use gate::{SpectralGateEngine, SPECTRAL_FLOOR};
pub use profile::{
    extract_auto_profile, extract_manual_profile, interpolate, profile_from_segment, NoiseProfile,
    ProfileSource,
};
pub use silence::{
    detect_silence_regions, detect_silence_regions_mono, frame_rms, longest_region, SilenceOptions,
};
pub use smoothing::{moving_average, smooth_mask, triangle_kernel};
pub use snr::estimate_snr;
pub use statistical::{reduce_noise, StatisticalOptions};
pub use stft::{fft_frequencies, hann_window, magnitude_phase, Spectrogram, Stft, HOP_LENGTH, N_FFT};
