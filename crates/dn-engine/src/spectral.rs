//! Spectral gate adapter

use dn_core::{ProgressFn, SignalBuffer};
use dn_spectral::{NoiseProfile, SpectralGateConfig, SpectralGateEngine};

use crate::adapter::EngineAdapter;
use crate::error::EngineResult;
use crate::kind::EngineKind;

/// Fraction of real time the gate typically needs
const REALTIME_FACTOR: f64 = 0.1;

/// In-process spectral gate, optionally with a supplied noise profile
pub struct SpectralGateAdapter {
    engine: SpectralGateEngine,
    profile: Option<NoiseProfile>,
}

impl SpectralGateAdapter {
    pub fn new(config: SpectralGateConfig) -> Self {
        Self {
            engine: SpectralGateEngine::new(config),
            profile: None,
        }
    }

    /// Use `profile` instead of estimating one per signal
    pub fn with_profile(mut self, profile: Option<NoiseProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn engine(&self) -> &SpectralGateEngine {
        &self.engine
    }

    pub fn profile(&self) -> Option<&NoiseProfile> {
        self.profile.as_ref()
    }
}

impl EngineAdapter for SpectralGateAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::SpectralGate
    }

    fn process(
        &self,
        signal: &SignalBuffer,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> EngineResult<SignalBuffer> {
        Ok(self.engine.process(signal, self.profile.as_ref(), progress)?)
    }

    fn estimate_processing_time(&self, duration_seconds: f64) -> f64 {
        duration_seconds * REALTIME_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dn_core::Cancelled;

    fn noisy(frames: usize, sample_rate: u32) -> SignalBuffer {
        let mut state = 0x2545_f491_u32;
        let samples = (0..frames)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
                let t = i as f32 / sample_rate as f32;
                0.4 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() + 0.05 * noise
            })
            .collect();
        SignalBuffer::mono(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_adapter_preserves_shape() {
        let adapter = SpectralGateAdapter::new(SpectralGateConfig::default());
        let input = noisy(16000, 16000);
        let output = adapter.process(&input, None).unwrap();
        assert_eq!(output.shape(), input.shape());
        assert_eq!(adapter.kind(), EngineKind::SpectralGate);
        assert!(adapter.is_available());
    }

    #[test]
    fn test_cancel_is_reported_as_cancellation() {
        let adapter = SpectralGateAdapter::new(SpectralGateConfig::aggressive());
        let mut callback = |_: f64, _: &str| -> Result<(), Cancelled> { Err(Cancelled) };
        let err = adapter
            .process(&noisy(8000, 16000), Some(&mut callback))
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
