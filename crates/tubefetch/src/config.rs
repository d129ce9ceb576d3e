use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Default muxer binary, overridable through `FFMPEG_PATH`.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// HTTP settings for [`crate::source::HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent string
    pub user_agent: String,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Proxy URL applied to all schemes, e.g. `socks5://127.0.0.1:1080`
    pub proxy: Option<String>,

    /// Whether to follow redirects
    pub follow_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            proxy: None,
            follow_redirects: true,
        }
    }
}

/// Configuration shared by every download task of a [`crate::Downloader`].
///
/// Built once and passed in explicitly; nothing in the engine reads global state.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Directory that receives output files; created on demand.
    pub output_dir: Option<PathBuf>,

    /// Muxer binary used for composite downloads.
    pub ffmpeg_path: String,

    /// Render progress bars on stderr.
    pub show_progress: bool,

    /// How often the progress renderer samples the byte counter.
    pub progress_tick: Duration,

    /// Fetch the video and audio streams of a composite download concurrently
    /// instead of one after the other.
    pub parallel_composite: bool,

    pub http: HttpConfig,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .unwrap_or_else(|_| DEFAULT_FFMPEG.to_string()),
            show_progress: true,
            progress_tick: Duration::from_millis(150),
            parallel_composite: false,
            http: HttpConfig::default(),
        }
    }
}

impl DownloaderConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_parallel_composite(mut self, parallel: bool) -> Self {
        self.parallel_composite = parallel;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}
