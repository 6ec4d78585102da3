//! Loudness normalization with BS.1770 integrated loudness
//!
//! Implements:
//! - K-weighting pre-filter (ITU-R BS.1770-4)
//! - 400 ms gating blocks with 75% overlap
//! - Absolute gate at -70 LUFS and relative gate at -10 LU
//!
//! The pipeline holds the normalizer as an optional capability. A pipeline
//! built without one skips the loudness step with a warning.

use dn_core::SignalBuffer;

use crate::error::{PipelineError, PipelineResult};

/// Blocks quieter than this never count toward integrated loudness
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;
const BLOCK_SECONDS: f64 = 0.4;
const STEP_SECONDS: f64 = 0.1;

/// Measures and adjusts programme loudness
pub trait LoudnessNormalizer: Send + Sync {
    /// Integrated loudness in LUFS; `-inf` for silence
    fn integrated_loudness(&self, buffer: &SignalBuffer) -> PipelineResult<f64>;

    /// `buffer` with gain applied so that `measured` becomes `target` (LUFS)
    fn normalize(&self, buffer: &SignalBuffer, measured: f64, target: f64) -> PipelineResult<SignalBuffer>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// K-WEIGHTING FILTER (ITU-R BS.1770-4)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new((b0, b1, b2, a1, a2): (f64, f64, f64, f64, f64)) -> Self {
        Self { b0, b1, b2, a1, a2, z1: 0.0, z2: 0.0 }
    }

    /// TDF-II
    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }
}

/// Stage 1: high shelf (+4 dB above ~1.7 kHz). Stage 2: high-pass (~38 Hz).
#[derive(Debug, Clone, Copy)]
struct KWeightingFilter {
    shelf: Biquad,
    high_pass: Biquad,
}

impl KWeightingFilter {
    fn new(sample_rate: f64) -> Self {
        Self {
            shelf: Biquad::new(Self::high_shelf_coeffs(sample_rate)),
            high_pass: Biquad::new(Self::high_pass_coeffs(sample_rate)),
        }
    }

    fn high_shelf_coeffs(fs: f64) -> (f64, f64, f64, f64, f64) {
        if (fs - 48000.0).abs() < 1.0 {
            // 48 kHz coefficients (ITU-R BS.1770-4)
            return (
                1.53512485958697,
                -2.69169618940638,
                1.19839281085285,
                -1.69065929318241,
                0.73248077421585,
            );
        }
        let gain_db = 3.999843853973347;
        let f0 = 1681.974450955533;
        let q = 0.7071752369554196;

        let k = (std::f64::consts::PI * f0 / fs).tan();
        let vh = 10.0_f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;

        (
            (vh + vb * k / q + k * k) / a0,
            2.0 * (k * k - vh) / a0,
            (vh - vb * k / q + k * k) / a0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / q + k * k) / a0,
        )
    }

    fn high_pass_coeffs(fs: f64) -> (f64, f64, f64, f64, f64) {
        if (fs - 48000.0).abs() < 1.0 {
            return (1.0, -2.0, 1.0, -1.99004745483398, 0.99007225036621);
        }
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (std::f64::consts::PI * f0 / fs).tan();
        let a0 = 1.0 + k / q + k * k;

        (
            1.0,
            -2.0,
            1.0,
            2.0 * (k * k - 1.0) / a0,
            (1.0 - k / q + k * k) / a0,
        )
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let shelved = self.shelf.process(input);
        self.high_pass.process(shelved)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METER
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-channel weights: L, R, C get 1.0, surrounds 1.41
fn channel_weight(channel: usize) -> f64 {
    if channel >= 3 { 1.41 } else { 1.0 }
}

fn block_loudness(weighted_power: f64) -> f64 {
    -0.691 + 10.0 * weighted_power.log10()
}

/// Gated integrated loudness of `buffer` in LUFS
///
/// Fails when the buffer is shorter than one 400 ms block.
pub fn integrated_loudness(buffer: &SignalBuffer) -> PipelineResult<f64> {
    let sample_rate = buffer.sample_rate() as f64;
    let block = (BLOCK_SECONDS * sample_rate).round() as usize;
    let step = ((STEP_SECONDS * sample_rate).round() as usize).max(1);
    let frames = buffer.frames();
    if block == 0 || frames < block {
        return Err(PipelineError::Loudness(format!(
            "audio must be at least {} ms long, got {:.0} ms",
            BLOCK_SECONDS * 1000.0,
            buffer.duration() * 1000.0
        )));
    }

    let channels = buffer.channels();
    let starts: Vec<usize> = (0..=frames - block).step_by(step).collect();

    // Mean square of each K-weighted channel per block: powers[block][channel]
    let mut powers = vec![vec![0.0f64; channels]; starts.len()];
    for ch in 0..channels {
        let mut filter = KWeightingFilter::new(sample_rate);
        let weighted: Vec<f64> = buffer
            .channel(ch)
            .iter()
            .map(|&s| filter.process(s as f64))
            .collect();

        let mut prefix = Vec::with_capacity(frames + 1);
        prefix.push(0.0f64);
        for x in &weighted {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + x * x);
        }
        for (j, &start) in starts.iter().enumerate() {
            powers[j][ch] = (prefix[start + block] - prefix[start]) / block as f64;
        }
    }

    let weighted_sum = |block_powers: &[f64]| -> f64 {
        block_powers
            .iter()
            .enumerate()
            .map(|(ch, p)| channel_weight(ch) * p)
            .sum()
    };
    let loudness: Vec<f64> = powers.iter().map(|p| block_loudness(weighted_sum(p))).collect();

    let gated_mean = |threshold: f64| -> Option<f64> {
        let selected: Vec<usize> = (0..starts.len())
            .filter(|&j| loudness[j] > threshold && loudness[j] > ABSOLUTE_GATE_LUFS)
            .collect();
        if selected.is_empty() {
            return None;
        }
        let total: f64 = (0..channels)
            .map(|ch| {
                let mean = selected.iter().map(|&j| powers[j][ch]).sum::<f64>() / selected.len() as f64;
                channel_weight(ch) * mean
            })
            .sum();
        Some(total)
    };

    let Some(absolute) = gated_mean(ABSOLUTE_GATE_LUFS) else {
        return Ok(f64::NEG_INFINITY);
    };
    let relative_gate = block_loudness(absolute) + RELATIVE_GATE_LU;
    Ok(gated_mean(relative_gate).map_or(f64::NEG_INFINITY, block_loudness))
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Static gain to a LUFS target, no limiting
#[derive(Debug, Clone, Copy, Default)]
pub struct LufsNormalizer;

impl LufsNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl LoudnessNormalizer for LufsNormalizer {
    fn integrated_loudness(&self, buffer: &SignalBuffer) -> PipelineResult<f64> {
        integrated_loudness(buffer)
    }

    fn normalize(&self, buffer: &SignalBuffer, measured: f64, target: f64) -> PipelineResult<SignalBuffer> {
        if !measured.is_finite() || !target.is_finite() {
            return Err(PipelineError::Loudness(format!(
                "cannot normalize from {} to {} LUFS",
                measured, target
            )));
        }
        let gain = db_to_linear(target - measured);
        let mut out = buffer.clone();
        out.apply_gain(gain as f32);
        if out.peak() > 1.0 {
            log::debug!("Loudness gain of {:.1} dB pushes peak above full scale", target - measured);
        }
        Ok(out)
    }
}

/// Convert dB to linear gain
fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
