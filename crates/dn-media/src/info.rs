//! Media stream description

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a media file contains
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    /// Seconds
    pub duration: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bit_depth: Option<u16>,
    pub codec: Option<String>,
    /// Container name
    pub format: Option<String>,
    pub has_audio: bool,
    pub has_video: bool,
    /// Container tags
    pub metadata: BTreeMap<String, String>,
}

impl MediaInfo {
    /// Duration formatted as `m:ss.mmm` or `h:mm:ss.mmm`
    pub fn duration_str(&self) -> String {
        let duration = self.duration.unwrap_or(0.0).max(0.0);
        let total_secs = duration as u64;
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        let ms = ((duration - total_secs as f64) * 1000.0) as u64;

        if hours > 0 {
            format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            format!("{}:{:02}.{:03}", mins, secs, ms)
        }
    }
}

impl std::fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        write!(
            f,
            "{}: {}, {} Hz, {} ch, {}",
            name,
            self.duration_str(),
            self.sample_rate.unwrap_or(0),
            self.channels.unwrap_or(0),
            self.codec.as_deref().unwrap_or("unknown")
        )
    }
}
