//! Media collaborator used by the processing pipeline

use std::path::{Path, PathBuf};

use dn_core::SignalBuffer;

use crate::decoder::{decode_file, probe_file};
use crate::error::{MediaError, MediaResult};
use crate::ffmpeg::Ffmpeg;
use crate::info::MediaInfo;
use crate::paths::is_audio_file;
use crate::resample::resample;
use crate::tools::{ToolPaths, ToolTimeouts};
use crate::wav::write_wav;

/// How to load audio
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadOptions {
    /// Resample to this rate; `None` keeps the file's rate
    pub sample_rate: Option<u32>,
    /// Downmix to a 1-D buffer
    pub mono: bool,
    /// Seconds
    pub start_time: Option<f64>,
    /// Seconds
    pub duration: Option<f64>,
}

/// Media I/O operations the pipeline depends on
///
/// Every call blocks until done and is bounded by a timeout when it runs an
/// external tool. Expected failures (missing file, bad codec, tool error)
/// come back as `Err`.
pub trait MediaBackend: Send + Sync {
    fn get_media_info(&self, path: &Path) -> MediaResult<MediaInfo>;

    fn load_audio(&self, path: &Path, options: &LoadOptions) -> MediaResult<SignalBuffer>;

    /// Write integer PCM WAV
    fn save_audio(
        &self,
        buffer: &SignalBuffer,
        path: &Path,
        bit_depth: u16,
        normalize: bool,
    ) -> MediaResult<()>;

    /// Replace the audio stream of `video` with `audio`
    fn remux_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        preserve_metadata: bool,
    ) -> MediaResult<()>;

    fn convert_audio_format(
        &self,
        input: &Path,
        output: &Path,
        format: &str,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        bitrate: Option<&str>,
    ) -> MediaResult<()>;
}

/// Native decode first, ffmpeg for video and anything symphonia rejects
#[derive(Debug, Clone, Default)]
pub struct DefaultMediaBackend {
    ffmpeg: Ffmpeg,
    temp_dir: Option<PathBuf>,
}

impl DefaultMediaBackend {
    pub fn new(paths: ToolPaths, timeouts: ToolTimeouts, temp_dir: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: Ffmpeg::new(paths, timeouts),
            temp_dir,
        }
    }

    pub fn ffmpeg(&self) -> &Ffmpeg {
        &self.ffmpeg
    }

    fn temp_wav(&self, prefix: &str) -> MediaResult<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(".wav");
        let file = match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        Ok(file)
    }

    fn shape(buffer: SignalBuffer, options: &LoadOptions) -> MediaResult<SignalBuffer> {
        let buffer = if options.mono && buffer.layout().is_multichannel() {
            let mono: Vec<f32> = buffer.to_mono().into_iter().map(|s| s as f32).collect();
            SignalBuffer::mono(mono, buffer.sample_rate())?
        } else {
            buffer
        };
        match options.sample_rate {
            Some(rate) if rate != buffer.sample_rate() => resample(&buffer, rate),
            _ => Ok(buffer),
        }
    }
}

impl MediaBackend for DefaultMediaBackend {
    fn get_media_info(&self, path: &Path) -> MediaResult<MediaInfo> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }
        if is_audio_file(path) {
            match probe_file(path) {
                Ok(info) => return Ok(info),
                Err(e) => log::debug!("Native probe failed, trying ffprobe: {}", e),
            }
        }
        self.ffmpeg.probe(path)
    }

    fn load_audio(&self, path: &Path, options: &LoadOptions) -> MediaResult<SignalBuffer> {
        if !path.exists() {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }

        if is_audio_file(path) {
            match decode_file(path, options.start_time, options.duration) {
                Ok(buffer) => {
                    let buffer = Self::shape(buffer, options)?;
                    log::debug!(
                        "Audio loaded directly: {:?} @ {} Hz",
                        buffer.shape(),
                        buffer.sample_rate()
                    );
                    return Ok(buffer);
                }
                Err(e) => log::warn!("Direct audio loading failed, trying FFmpeg: {}", e),
            }
        }

        log::info!("Extracting audio from {} using FFmpeg", path.display());
        let temp = self.temp_wav("dn_extract_")?;
        self.ffmpeg.extract_audio(
            path,
            temp.path(),
            options.sample_rate,
            None,
            options.start_time,
            options.duration,
        )?;
        // The extracted file already has the requested rate and window
        let buffer = decode_file(temp.path(), None, None)?;
        let buffer = Self::shape(buffer, options)?;
        log::debug!(
            "Audio loaded from extracted file: {:?} @ {} Hz",
            buffer.shape(),
            buffer.sample_rate()
        );
        Ok(buffer)
    }

    fn save_audio(
        &self,
        buffer: &SignalBuffer,
        path: &Path,
        bit_depth: u16,
        normalize: bool,
    ) -> MediaResult<()> {
        write_wav(buffer, path, bit_depth, normalize)
    }

    fn remux_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        preserve_metadata: bool,
    ) -> MediaResult<()> {
        self.ffmpeg
            .remux_audio_video(video, audio, output, preserve_metadata)
    }

    fn convert_audio_format(
        &self,
        input: &Path,
        output: &Path,
        format: &str,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        bitrate: Option<&str>,
    ) -> MediaResult<()> {
        self.ffmpeg
            .convert_audio_format(input, output, format, sample_rate, channels, bitrate)
    }
}
