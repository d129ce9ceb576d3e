use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::StatusCode;

/// What a failed format lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSubject {
    Video,
    Audio,
    Itag(u32),
    /// Any downloadable format (plain single-stream selection).
    Format,
}

impl fmt::Display for FormatSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Itag(itag) => write!(f, "itag={itag}"),
            Self::Format => write!(f, "format"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("no {subject} format found after filtering")]
    NotFound { subject: FormatSubject },

    #[error("format selection precheck failed: {reason}")]
    SelectionPrecheck { reason: String },

    #[error("failed to open stream: {reason}")]
    StreamOpen { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("transfer failed: {source}")]
    Transfer { source: std::io::Error },

    #[error("`{tool}` is not installed or not on PATH")]
    ToolMissing { tool: String },

    #[error("`{tool}` exited with {}", exit_label(.code))]
    MergeFailed { tool: String, code: Option<i32> },

    #[error("{op} `{}` failed: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid catalog: {reason}")]
    Catalog { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl DownloadError {
    pub fn not_found(subject: FormatSubject) -> Self {
        Self::NotFound { subject }
    }

    pub fn stream_open(reason: impl Into<String>) -> Self {
        Self::StreamOpen {
            reason: reason.into(),
        }
    }

    pub fn catalog(reason: impl Into<String>) -> Self {
        Self::Catalog {
            reason: reason.into(),
        }
    }

    pub fn tool_missing(tool: impl Into<String>) -> Self {
        Self::ToolMissing { tool: tool.into() }
    }

    pub fn filesystem(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Advisory hint for callers that restart whole tasks. Nothing in this
    /// crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::NotFound { .. }
            | Self::SelectionPrecheck { .. }
            | Self::ToolMissing { .. }
            | Self::MergeFailed { .. }
            | Self::Filesystem { .. }
            | Self::Catalog { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::StreamOpen { .. }
            | Self::Network { .. }
            | Self::Transfer { .. }
            | Self::Io { .. } => true,
        }
    }
}
