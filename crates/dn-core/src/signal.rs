//! Signal buffer carried between pipeline stages

use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape of a signal buffer
///
/// `Mono` is a 1-D buffer. `Interleaved` is a 2-D (frames × channels) buffer
/// stored frame-major; a single-channel 2-D buffer stays 2-D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Interleaved { channels: usize },
}

impl ChannelLayout {
    /// Number of channels described by this layout
    pub fn channels(&self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Interleaved { channels } => *channels,
        }
    }

    /// True for 2-D layouts
    pub fn is_multichannel(&self) -> bool {
        matches!(self, Self::Interleaved { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNAL BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// f32 sample buffer with explicit layout and sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBuffer {
    samples: Vec<f32>,
    layout: ChannelLayout,
    sample_rate: u32,
}

impl SignalBuffer {
    /// Create a 1-D buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> SignalResult<Self> {
        if sample_rate == 0 {
            return Err(SignalError::InvalidSampleRate);
        }
        Ok(Self {
            samples,
            layout: ChannelLayout::Mono,
            sample_rate,
        })
    }

    /// Create a 2-D buffer from interleaved samples
    pub fn interleaved(samples: Vec<f32>, channels: usize, sample_rate: u32) -> SignalResult<Self> {
        if channels == 0 {
            return Err(SignalError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(SignalError::InvalidSampleRate);
        }
        if samples.len() % channels != 0 {
            return Err(SignalError::RaggedInterleave {
                len: samples.len(),
                channels,
            });
        }
        Ok(Self {
            samples,
            layout: ChannelLayout::Interleaved { channels },
            sample_rate,
        })
    }

    /// Create a buffer with the given layout
    pub fn with_layout(samples: Vec<f32>, layout: ChannelLayout, sample_rate: u32) -> SignalResult<Self> {
        match layout {
            ChannelLayout::Mono => Self::mono(samples, sample_rate),
            ChannelLayout::Interleaved { channels } => {
                Self::interleaved(samples, channels, sample_rate)
            }
        }
    }

    /// Build a 2-D buffer from per-channel planes of equal length
    pub fn from_planes(planes: &[Vec<f32>], sample_rate: u32) -> SignalResult<Self> {
        let channels = planes.len();
        if channels == 0 {
            return Err(SignalError::NoChannels);
        }
        let frames = planes[0].len();
        if let Some(bad) = planes.iter().find(|p| p.len() != frames) {
            return Err(SignalError::FrameMismatch {
                expected: frames,
                actual: bad.len(),
            });
        }

        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for plane in planes {
                samples.push(plane[frame]);
            }
        }
        Self::interleaved(samples, channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Shape as (frames, channels) where channels is `None` for 1-D buffers
    pub fn shape(&self) -> (usize, Option<usize>) {
        match self.layout {
            ChannelLayout::Mono => (self.frames(), None),
            ChannelLayout::Interleaved { channels } => (self.frames(), Some(channels)),
        }
    }

    /// Extract one channel
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        let channels = self.channels();
        if channel >= channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(channel)
            .step_by(channels)
            .copied()
            .collect()
    }

    /// Overwrite one channel; extra input samples are ignored
    pub fn set_channel(&mut self, channel: usize, data: &[f32]) {
        let channels = self.channels();
        if channel >= channels {
            return;
        }
        for (i, &sample) in data.iter().enumerate().take(self.frames()) {
            self.samples[i * channels + channel] = sample;
        }
    }

    /// Mean across channels, in f64 for analysis
    pub fn to_mono(&self) -> Vec<f64> {
        let channels = self.channels();
        if channels == 1 {
            return self.samples.iter().map(|&s| s as f64).collect();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
            .collect()
    }

    /// Duplicate a mono signal into a buffer shaped like `self`
    ///
    /// `mono` must have exactly `self.frames()` samples.
    pub fn expand_like(&self, mono: &[f64]) -> SignalResult<SignalBuffer> {
        if mono.len() != self.frames() {
            return Err(SignalError::FrameMismatch {
                expected: self.frames(),
                actual: mono.len(),
            });
        }
        let channels = self.channels();
        let mut samples = Vec::with_capacity(mono.len() * channels);
        for &s in mono {
            for _ in 0..channels {
                samples.push(s as f32);
            }
        }
        Ok(SignalBuffer {
            samples,
            layout: self.layout,
            sample_rate: self.sample_rate,
        })
    }

    /// Frames `[start, end)` with the same layout
    pub fn slice_frames(&self, start: usize, end: usize) -> SignalBuffer {
        let channels = self.channels();
        let end = end.min(self.frames());
        let start = start.min(end);
        SignalBuffer {
            samples: self.samples[start * channels..end * channels].to_vec(),
            layout: self.layout,
            sample_rate: self.sample_rate,
        }
    }

    /// Pad with zeros or truncate to `frames`
    pub fn resize_frames(&mut self, frames: usize) {
        self.samples.resize(frames * self.channels(), 0.0);
    }

    /// Apply gain in place
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Peak absolute level (linear)
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    /// Peak level in dBFS
    pub fn peak_db(&self) -> f64 {
        let peak = self.peak() as f64;
        if peak <= 0.0 {
            f64::NEG_INFINITY
        } else {
            20.0 * peak.log10()
        }
    }

    /// RMS across all samples
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    /// Same samples, different layout (used after resampling or reshaping)
    pub fn relabel(self, layout: ChannelLayout) -> SignalResult<SignalBuffer> {
        Self::with_layout(self.samples, layout, self.sample_rate)
    }
}
