//! Adapter contract: shape preservation and progress ordering

use dn_core::{Cancelled, SignalBuffer};
use dn_engine::{create_engine, ConfigMap, ConfigValue, EngineKind, EngineToolchain};

fn tone_with_hiss(frames: usize, channels: usize, sample_rate: u32) -> SignalBuffer {
    let mut state = 12345u32;
    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        // Quiet lead-in gives the profile estimator a silent region
        let tone = if t < 0.6 { 0.0 } else { 0.5 * (2.0 * std::f32::consts::PI * 330.0 * t).sin() };
        for _ in 0..channels {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let noise = ((state >> 16) & 0x7fff) as f32 / 32768.0 - 0.5;
            samples.push(tone + 0.02 * noise);
        }
    }
    SignalBuffer::interleaved(samples, channels, sample_rate).unwrap()
}

#[test]
fn spectral_gate_preserves_stereo_shape() {
    let toolchain = EngineToolchain::default();
    for reduction in [20.0, 45.0] {
        let mut config = ConfigMap::new();
        config.insert("reduction_db".into(), ConfigValue::Float(reduction));
        let engine = create_engine(EngineKind::SpectralGate, &config, &toolchain, None).unwrap();

        let input = tone_with_hiss(22050 * 2, 2, 22050);
        let output = engine.process(&input, None).unwrap();
        assert_eq!(output.shape(), input.shape());
        assert_eq!(output.sample_rate(), input.sample_rate());
        assert!(output.samples().iter().all(|s| s.is_finite()));
    }
}

#[test]
fn spectral_gate_progress_is_monotone() {
    let engine = create_engine(
        EngineKind::SpectralGate,
        &ConfigMap::new(),
        &EngineToolchain::default(),
        None,
    )
    .unwrap();

    let mut seen = Vec::new();
    let mut callback = |fraction: f64, _: &str| -> Result<(), Cancelled> {
        seen.push(fraction);
        Ok(())
    };
    engine
        .process(&tone_with_hiss(16000, 1, 16000), Some(&mut callback))
        .unwrap();

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn rnnoise_round_trip_when_installed() {
    let toolchain = EngineToolchain::default();
    let engine = create_engine(EngineKind::RNNoise, &ConfigMap::new(), &toolchain, None).unwrap();
    if !engine.is_available() {
        eprintln!("skipping: ffmpeg with arnndn not found");
        return;
    }

    let input = tone_with_hiss(16000, 1, 16000);
    match engine.process(&input, None) {
        Ok(output) => assert_eq!(output.shape(), input.shape()),
        // No model files in the working directory
        Err(dn_engine::EngineError::Model(_)) => eprintln!("skipping: no RNNoise model"),
        Err(e) => panic!("RNNoise failed: {e}"),
    }
}
