//! Sample rate conversion with rubato

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use dn_core::SignalBuffer;

use crate::error::{MediaError, MediaResult};

const SINC_LEN: usize = 256;

fn sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resample to `target_rate`, keeping the channel layout
///
/// Output has `round(frames * target / source)` frames, aligned so the
/// resampler's delay is removed.
pub fn resample(buffer: &SignalBuffer, target_rate: u32) -> MediaResult<SignalBuffer> {
    if target_rate == 0 {
        return Err(MediaError::Resample("target sample rate is zero".into()));
    }
    if buffer.sample_rate() == target_rate || buffer.is_empty() {
        let samples = buffer.samples().to_vec();
        return Ok(SignalBuffer::with_layout(samples, buffer.layout(), target_rate)?);
    }

    let ratio = target_rate as f64 / buffer.sample_rate() as f64;
    let frames = buffer.frames();
    let channels = buffer.channels();
    let target_frames = (frames as f64 * ratio).round() as usize;

    // Trailing zeros let the filter tail flush within one call
    let chunk = frames + SINC_LEN;
    let planes: Vec<Vec<f32>> = (0..channels)
        .map(|ch| {
            let mut plane = buffer.channel(ch);
            plane.resize(chunk, 0.0);
            plane
        })
        .collect();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_parameters(), chunk, channels)
        .map_err(|e| MediaError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();
    let output = resampler
        .process(&planes, None)
        .map_err(|e| MediaError::Resample(e.to_string()))?;

    let aligned: Vec<Vec<f32>> = output
        .into_iter()
        .map(|plane| {
            let mut plane: Vec<f32> = plane.into_iter().skip(delay).take(target_frames).collect();
            plane.resize(target_frames, 0.0);
            plane
        })
        .collect();

    let mut samples = Vec::with_capacity(target_frames * channels);
    for frame in 0..target_frames {
        for plane in &aligned {
            samples.push(plane[frame]);
        }
    }

    log::debug!(
        "Resampled {} -> {} Hz ({} -> {} frames)",
        buffer.sample_rate(),
        target_rate,
        frames,
        target_frames
    );
    Ok(SignalBuffer::with_layout(samples, buffer.layout(), target_rate)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, sample_rate: u32, freq: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_upsample_length_and_layout() {
        let buffer = SignalBuffer::mono(tone(16000, 16000, 440.0), 16000).unwrap();
        let out = resample(&buffer, 48000).unwrap();
        assert_eq!(out.shape(), (48000, None));
        assert_eq!(out.sample_rate(), 48000);
    }

    #[test]
    fn test_downsample_stereo() {
        let mono = tone(4410, 44100, 1000.0);
        let buffer = SignalBuffer::from_planes(&[mono.clone(), mono], 44100).unwrap();
        let out = resample(&buffer, 22050).unwrap();
        assert_eq!(out.shape(), (2205, Some(2)));
    }

    #[test]
    fn test_resample_preserves_level() {
        let buffer = SignalBuffer::mono(tone(22050, 22050, 300.0), 22050).unwrap();
        let out = resample(&buffer, 44100).unwrap();
        // Compare away from the edges
        let mid = &out.samples()[4410..39690];
        let peak = mid.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak {}", peak);
    }

    #[test]
    fn test_same_rate_is_copy() {
        let buffer = SignalBuffer::mono(vec![0.1, 0.2], 8000).unwrap();
        assert_eq!(resample(&buffer, 8000).unwrap(), buffer);
    }
}
