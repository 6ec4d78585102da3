//! Native audio decoding
//!
//! Uses symphonia for the audio formats accepted as input:
//! - WAV, AIFF (PCM)
//! - FLAC, ALAC (lossless)
//! - MP3, OGG Vorbis, AAC/M4A (lossy)

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use dn_core::SignalBuffer;

use crate::error::{MediaError, MediaResult};
use crate::info::MediaInfo;

/// Extensions symphonia is built to decode here
pub const NATIVE_FORMATS: &[&str] = &["wav", "flac", "mp3", "ogg", "aac", "m4a", "aiff"];

fn open_format(path: &Path) -> MediaResult<Box<dyn FormatReader>> {
    if !path.exists() {
        return Err(MediaError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaError::Decode(format!("Failed to probe format: {}", e)))?;
    Ok(probed.format)
}

/// Decode an audio file, optionally limited to a time window
///
/// Mono files produce a 1-D buffer; anything else is interleaved 2-D.
pub fn decode_file(
    path: &Path,
    start_time: Option<f64>,
    duration: Option<f64>,
) -> MediaResult<SignalBuffer> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::Decode(format!("Packet read error: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(MediaError::Decode(format!("Decode error: {}", e))),
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(MediaError::Decode(format!(
            "Unknown sample rate or channel layout in {}",
            path.display()
        )));
    }

    let buffer = if channels == 1 {
        SignalBuffer::mono(samples, sample_rate)?
    } else {
        SignalBuffer::interleaved(samples, channels, sample_rate)?
    };

    Ok(trim_window(buffer, start_time, duration))
}

/// Cut `[start, start + duration)` seconds out of a decoded buffer
fn trim_window(buffer: SignalBuffer, start_time: Option<f64>, duration: Option<f64>) -> SignalBuffer {
    if start_time.is_none() && duration.is_none() {
        return buffer;
    }
    let sr = buffer.sample_rate() as f64;
    let start = (start_time.unwrap_or(0.0).max(0.0) * sr) as usize;
    let end = match duration {
        Some(d) => start.saturating_add((d.max(0.0) * sr) as usize),
        None => buffer.frames(),
    };
    buffer.slice_frames(start, end)
}

/// Read stream parameters without decoding
pub fn probe_file(path: &Path) -> MediaResult<MediaInfo> {
    let format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::NoAudioTrack(path.to_path_buf()))?;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate;
    let duration = match (params.n_frames, sample_rate) {
        (Some(frames), Some(sr)) if sr > 0 => Some(frames as f64 / sr as f64),
        _ => None,
    };
    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_string());

    Ok(MediaInfo {
        path: path.to_path_buf(),
        duration,
        sample_rate,
        channels: params.channels.map(|c| c.count() as u16),
        bit_depth: params.bits_per_sample.map(|b| b as u16),
        codec,
        format: path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase()),
        has_audio: true,
        has_video: false,
        metadata: Default::default(),
    })
}
