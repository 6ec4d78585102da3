//! ffmpeg / ffprobe invocations
//!
//! Every call is bounded by the matching [`ToolTimeouts`] entry and logs
//! its full command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MediaError, MediaResult};
use crate::info::MediaInfo;
use crate::process::{command_line, run_checked, run_with_timeout};
use crate::tools::{ToolPaths, ToolTimeouts};

/// Audio encodings understood by [`Ffmpeg::convert_audio_format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Aac,
    Flac,
}

impl AudioFormat {
    /// Parse a format name or extension (leading dot allowed)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "aac" | "m4a" => Some(Self::Aac),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    /// Codec arguments, with the bitrate applied where it matters
    fn codec_args(&self, bitrate: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match self {
            Self::Mp3 => {
                args.extend(["-c:a".into(), "libmp3lame".into()]);
                match bitrate {
                    Some(rate) => args.extend(["-b:a".into(), rate.to_string()]),
                    None => args.extend(["-q:a".into(), "0".into()]),
                }
            }
            Self::Aac => {
                args.extend(["-c:a".into(), "aac".into()]);
                args.extend(["-b:a".into(), bitrate.unwrap_or("192k").to_string()]);
            }
            Self::Flac => args.extend(["-c:a".into(), "flac".into()]),
            Self::Wav => args.extend(["-c:a".into(), "pcm_s16le".into()]),
        }
        args
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FFPROBE JSON
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize, Default)]
struct ProbeReport {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bits_per_sample: Option<u16>,
}

/// Build [`MediaInfo`] from `ffprobe -print_format json` output
pub fn parse_probe_json(path: &Path, json: &str) -> MediaResult<MediaInfo> {
    let report: ProbeReport = serde_json::from_str(json)?;
    let mut info = MediaInfo {
        path: path.to_path_buf(),
        ..Default::default()
    };

    if let Some(format) = report.format {
        info.duration = format.duration.and_then(|d| d.parse().ok());
        info.format = format.format_name;
        info.metadata = format.tags;
    }

    for stream in report.streams {
        match stream.codec_type.as_deref() {
            Some("audio") => {
                info.has_audio = true;
                info.sample_rate = stream.sample_rate.and_then(|s| s.parse().ok());
                info.channels = stream.channels;
                info.codec = stream.codec_name;
                info.bit_depth = stream.bits_per_sample.filter(|&b| b > 0);
            }
            Some("video") => info.has_video = true,
            _ => {}
        }
    }
    Ok(info)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FFMPEG
// ═══════════════════════════════════════════════════════════════════════════════

/// ffmpeg/ffprobe front end
#[derive(Debug, Clone, Default)]
pub struct Ffmpeg {
    paths: ToolPaths,
    timeouts: ToolTimeouts,
}

impl Ffmpeg {
    pub fn new(paths: ToolPaths, timeouts: ToolTimeouts) -> Self {
        Self { paths, timeouts }
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    pub fn timeouts(&self) -> &ToolTimeouts {
        &self.timeouts
    }

    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.paths.ffmpeg);
        cmd.arg("-y").arg("-hide_banner");
        cmd
    }

    /// First line of `ffmpeg -version`, if ffmpeg runs
    pub fn version(&self) -> Option<String> {
        let mut cmd = Command::new(&self.paths.ffmpeg);
        cmd.arg("-version");
        let output = run_with_timeout(&mut cmd, self.timeouts.capability()).ok()?;
        if !output.status.success() {
            return None;
        }
        output.stdout_lossy().lines().next().map(str::to_string)
    }

    pub fn is_available(&self) -> bool {
        self.version().is_some()
    }

    /// True if `ffmpeg -filters` lists `name`
    pub fn has_filter(&self, name: &str) -> bool {
        let mut cmd = Command::new(&self.paths.ffmpeg);
        cmd.args(["-hide_banner", "-filters"]);
        match run_with_timeout(&mut cmd, self.timeouts.capability()) {
            Ok(output) if output.status.success() => output
                .stdout_lossy()
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name)),
            Ok(_) => false,
            Err(e) => {
                log::debug!("ffmpeg filter probe failed: {}", e);
                false
            }
        }
    }

    /// Stream information via ffprobe
    pub fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        let mut cmd = Command::new(&self.paths.ffprobe);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        let output = run_checked(&mut cmd, self.timeouts.probe())?;
        let info = parse_probe_json(path, &output.stdout_lossy())?;
        log::debug!("Media info extracted: {}", info);
        Ok(info)
    }

    /// Extract the audio track to 16-bit PCM WAV
    pub fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        start_time: Option<f64>,
        duration: Option<f64>,
    ) -> MediaResult<PathBuf> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(input);
        if let Some(start) = start_time {
            cmd.arg("-ss").arg(start.to_string());
        }
        if let Some(duration) = duration {
            cmd.arg("-t").arg(duration.to_string());
        }
        cmd.arg("-vn");
        if let Some(rate) = sample_rate {
            cmd.arg("-ar").arg(rate.to_string());
        }
        if let Some(channels) = channels {
            cmd.arg("-ac").arg(channels.to_string());
        }
        cmd.args(["-c:a", "pcm_s16le"]).arg(output);

        log::info!("Extracting audio: {}", command_line(&cmd));
        run_checked(&mut cmd, self.timeouts.extract())?;
        if !output.exists() {
            return Err(MediaError::MissingOutput(output.to_path_buf()));
        }
        log::info!("Audio extracted to {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Replace the audio stream of `video`, copying video and subtitles
    pub fn remux_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        preserve_metadata: bool,
    ) -> MediaResult<()> {
        ensure_parent(output)?;
        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(video).arg("-i").arg(audio);
        cmd.args([
            "-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0", "-shortest", "-map",
            "0:s?", "-c:s", "copy",
        ]);
        if preserve_metadata {
            cmd.args(["-map_metadata", "0"]);
        }
        cmd.arg(output);

        log::info!("Remuxing video: {}", command_line(&cmd));
        run_checked(&mut cmd, self.timeouts.remux())?;
        if !output.exists() {
            return Err(MediaError::MissingOutput(output.to_path_buf()));
        }
        log::info!("Video remuxed: {}", output.display());
        Ok(())
    }

    /// Transcode an audio file
    pub fn convert_audio_format(
        &self,
        input: &Path,
        output: &Path,
        format: &str,
        sample_rate: Option<u32>,
        channels: Option<u16>,
        bitrate: Option<&str>,
    ) -> MediaResult<()> {
        ensure_parent(output)?;
        // Unknown names are written as PCM
        let codec = AudioFormat::parse(format).unwrap_or(AudioFormat::Wav);

        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(input);
        cmd.args(codec.codec_args(bitrate));
        if let Some(rate) = sample_rate {
            cmd.arg("-ar").arg(rate.to_string());
        }
        if let Some(channels) = channels {
            cmd.arg("-ac").arg(channels.to_string());
        }
        cmd.arg(output);

        log::info!("Converting audio format: {}", command_line(&cmd));
        run_checked(&mut cmd, self.timeouts.convert())?;
        log::info!("Audio converted: {}", output.display());
        Ok(())
    }

    /// Run an audio filter graph (`-af`) and write 16-bit PCM WAV
    pub fn filter_audio(
        &self,
        input: &Path,
        output: &Path,
        filter: &str,
        sample_rate: Option<u32>,
        timeout: Duration,
    ) -> MediaResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i").arg(input).arg("-af").arg(filter);
        if let Some(rate) = sample_rate {
            cmd.arg("-ar").arg(rate.to_string());
        }
        cmd.args(["-c:a", "pcm_s16le"]).arg(output);

        log::info!("Filtering audio: {}", command_line(&cmd));
        run_checked(&mut cmd, timeout)?;
        if !output.exists() {
            return Err(MediaError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
