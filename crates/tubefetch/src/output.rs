//! Output path resolution.

use std::path::{Path, PathBuf};

use crate::error::DownloadError;
use crate::format::{Format, Video, media_type_of};

/// Extension used when the media type is not in [`CANONICAL_EXTENSIONS`].
pub const FALLBACK_EXTENSION: &str = ".mov";

/// Media type to file extension.
const CANONICAL_EXTENSIONS: &[(&str, &str)] = &[
    ("video/quicktime", ".mov"),
    ("video/x-msvideo", ".avi"),
    ("video/x-matroska", ".mkv"),
    ("video/mpeg", ".mpeg"),
    ("video/webm", ".webm"),
    ("video/3gpp2", ".3g2"),
    ("video/x-flv", ".flv"),
    ("video/3gpp", ".3gp"),
    ("video/mp4", ".mp4"),
    ("video/ogg", ".ogv"),
    ("video/mp2t", ".ts"),
    ("audio/mp4", ".m4a"),
    ("audio/webm", ".weba"),
    ("audio/mpeg", ".mp3"),
    ("audio/ogg", ".ogg"),
];

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// File extension (with leading dot) for a MIME type such as
/// `video/mp4; codecs="avc1.4d401e"`.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let media_type = media_type_of(mime_type);

    CANONICAL_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == media_type)
        .map(|(_, ext)| *ext)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Make a video title usable as a file name on every platform.
///
/// Control characters and characters Windows rejects become `_` (runs are
/// collapsed), surrounding spaces and dots are trimmed, reserved device names
/// get a `_` prefix and an empty result becomes `unnamed`.
pub fn sanitize_filename(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut replaced_last = false;

    for c in title.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !replaced_last {
                name.push('_');
                replaced_last = true;
            }
        } else {
            name.push(c);
            replaced_last = false;
        }
    }

    let trimmed = name.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed).to_uppercase();
    if WINDOWS_RESERVED_NAMES.contains(&stem.as_str()) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// Create `dir` and its parents, owner rwx and group/other rx on unix.
pub fn ensure_output_dir(dir: &Path) -> Result<(), DownloadError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(dir)
        .map_err(|e| DownloadError::filesystem("creating directory", dir, e))
}

/// Destination path of a download.
///
/// An empty `explicit_name` is replaced by the sanitized title plus the
/// extension implied by `format`. A non-empty `output_dir` is created if
/// needed and prepended.
pub fn resolve_output_path(
    video: &Video,
    format: &Format,
    explicit_name: &str,
    output_dir: Option<&Path>,
) -> Result<PathBuf, DownloadError> {
    let name = if explicit_name.is_empty() {
        format!(
            "{}{}",
            sanitize_filename(&video.title),
            extension_for_mime(&format.mime_type)
        )
    } else {
        explicit_name.to_string()
    };

    match output_dir {
        Some(dir) if !dir.as_os_str().is_empty() => {
            ensure_output_dir(dir)?;
            Ok(dir.join(name))
        }
        _ => Ok(PathBuf::from(name)),
    }
}
