//! File naming: output patterns, collision-free paths, media type checks

use std::path::{Path, PathBuf};

/// Extensions treated as audio input
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "aac", "ogg", "m4a", "wma", "aiff"];

/// Extensions treated as video input
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v"];

/// Default output naming
pub const DEFAULT_OUTPUT_PATTERN: &str = "{parent}/clean/{name}_clean{ext}";

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_audio_file(path: &Path) -> bool {
    extension_lower(path).is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_video_file(path: &Path) -> bool {
    extension_lower(path).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_media_file(path: &Path) -> bool {
    is_audio_file(path) || is_video_file(path)
}

/// Replace characters that are invalid in file names
///
/// `<>:"/\|?*` become `_`, runs of `_` collapse, surrounding dots and
/// spaces are stripped. An empty result becomes `untitled`.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Output path for `input`
///
/// `pattern` accepts `{parent}`, `{name}` (stem), `{ext}` (with dot) and
/// `{stem}` (full file name). `format` overrides the extension. With
/// `output_dir` set the pattern is ignored and `{name}_clean{ext}` is placed
/// in that directory.
pub fn generate_output_path(
    input: &Path,
    pattern: &str,
    format: Option<&str>,
    output_dir: Option<&Path>,
) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    let name = sanitize_filename(&input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default());
    let file_name = sanitize_filename(&input.file_name().map(|s| s.to_string_lossy()).unwrap_or_default());

    let ext = match format {
        Some(f) if !f.is_empty() => format!(".{}", f.trim_start_matches('.')),
        _ => input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
    };

    match output_dir {
        Some(dir) => dir.join(format!("{}_clean{}", name, ext)),
        None => {
            let parent = parent.to_string_lossy();
            let parent = if parent.is_empty() { "." } else { parent.as_ref() };
            PathBuf::from(
                pattern
                    .replace("{parent}", parent)
                    .replace("{name}", &name)
                    .replace("{ext}", &ext)
                    .replace("{stem}", &file_name),
            )
        }
    }
}

/// `path` if free, else the first free `stem_N.ext` for N = 1, 2, ...
pub fn get_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|n| parent.join(format!("{}_{}{}", stem, n, suffix)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Sibling path with `suffix` inserted before the extension
pub fn sibling_with_suffix(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{}{}.{}", stem, suffix, extension.trim_start_matches('.')))
}
