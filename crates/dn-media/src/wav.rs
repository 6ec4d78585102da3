//! PCM WAV output via hound

use std::path::Path;

use dn_core::SignalBuffer;

use crate::error::{MediaError, MediaResult};

/// Peak level after save-time normalization
pub const NORMALIZE_PEAK: f32 = 0.95;

/// Bit depths written as integer PCM
pub const SUPPORTED_BIT_DEPTHS: &[u16] = &[16, 24, 32];

/// Write `buffer` as integer PCM WAV
///
/// With `normalize`, the buffer is scaled so its peak sits at
/// [`NORMALIZE_PEAK`]. Unsupported bit depths fall back to 16-bit.
pub fn write_wav(buffer: &SignalBuffer, path: &Path, bit_depth: u16, normalize: bool) -> MediaResult<()> {
    let bit_depth = if SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
        bit_depth
    } else {
        log::warn!("Unsupported bit depth {}, using 16-bit", bit_depth);
        16
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let gain = if normalize {
        let peak = buffer.peak();
        if peak > 0.0 { NORMALIZE_PEAK / peak } else { 1.0 }
    } else {
        1.0
    };

    let spec = hound::WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| MediaError::Encode(e.to_string()))?;

    let full_scale = (1i64 << (bit_depth - 1)) as f64;
    let max = full_scale - 1.0;
    for &sample in buffer.samples() {
        let scaled = ((sample * gain).clamp(-1.0, 1.0) as f64 * full_scale).round();
        let value = scaled.clamp(-full_scale, max) as i32;
        writer
            .write_sample(value)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    log::info!("Audio saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(path: &Path) -> (hound::WavSpec, Vec<i32>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_write_normalized_16bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.wav");
        let buffer = SignalBuffer::mono(vec![0.0, 0.5, -0.25], 16000).unwrap();

        write_wav(&buffer, &path, 16, true).unwrap();
        let (spec, samples) = read_back(&path);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples[1], (0.95f64 * 32768.0).round() as i32);
    }

    #[test]
    fn test_write_stereo_24bit_unnormalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let buffer = SignalBuffer::interleaved(vec![0.5, -0.5, 1.5, -1.5], 2, 48000).unwrap();

        write_wav(&buffer, &path, 24, false).unwrap();
        let (spec, samples) = read_back(&path);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 24);
        assert_eq!(samples[0], 1 << 22);
        // Clipped to full scale
        assert_eq!(samples[2], (1 << 23) - 1);
        assert_eq!(samples[3], -(1 << 23));
    }

    #[test]
    fn test_unsupported_depth_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.wav");
        let buffer = SignalBuffer::mono(vec![0.1; 10], 8000).unwrap();

        write_wav(&buffer, &path, 12, false).unwrap();
        assert_eq!(read_back(&path).0.bits_per_sample, 16);
    }
}
