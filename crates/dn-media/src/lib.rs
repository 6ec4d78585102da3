//! Media I/O for the denoise pipeline
//!
//! - [`MediaBackend`]: the load/save/remux/convert/probe contract the pipeline uses
//! - [`DefaultMediaBackend`]: symphonia + hound natively, ffmpeg for everything else
//! - [`paths`]: output naming and collision-free paths
//!
//! External tools always run under a timeout ([`ToolTimeouts`]).

mod backend;
mod decoder;
mod error;
mod ffmpeg;
mod info;
pub mod paths;
mod process;
mod resample;
mod tools;
mod wav;

pub use backend::{DefaultMediaBackend, LoadOptions, MediaBackend};
pub use decoder::{decode_file, probe_file, NATIVE_FORMATS};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::{parse_probe_json, AudioFormat, Ffmpeg};
pub use info::MediaInfo;
pub use paths::{
    generate_output_path, get_unique_path, is_audio_file, is_media_file, is_video_file,
    sanitize_filename, DEFAULT_OUTPUT_PATTERN,
};
pub use process::{command_line, run_checked, run_with_timeout, ToolOutput};
pub use resample::resample;
pub use tools::{ToolPaths, ToolTimeouts};
pub use wav::{write_wav, NORMALIZE_PEAK};
