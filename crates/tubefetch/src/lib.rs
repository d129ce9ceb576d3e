//! # tubefetch engine
//!
//! Picks streams out of a video's format catalog, downloads them with live
//! progress and, when the requested quality is only published as separate
//! video and audio streams, merges the two with ffmpeg.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tubefetch_engine::{Downloader, DownloaderConfig, HttpSource};
//!
//! # async fn run() -> Result<(), tubefetch_engine::DownloadError> {
//! let config = DownloaderConfig::default().with_output_dir("downloads");
//! let source = Arc::new(HttpSource::new(&config.http)?);
//! let downloader = Downloader::new(config, source);
//!
//! let video = downloader.fetch_video("catalog.json").await?;
//! let token = CancellationToken::new();
//! downloader
//!     .download_composite(&token, "", &video, "hd1080", "mp4")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod config;
pub mod downloader;
pub mod error;
pub mod format;
pub mod mux;
pub mod output;
pub mod progress;
pub mod selector;
pub mod source;
pub mod worker;

pub use composite::{CompositeAssembler, CompositeStage};
pub use config::{DownloaderConfig, HttpConfig};
pub use downloader::Downloader;
pub use error::{DownloadError, FormatSubject};
pub use format::{Format, FormatList, Video};
pub use mux::{FfmpegMuxer, Muxer};
pub use output::{extension_for_mime, resolve_output_path, sanitize_filename};
pub use selector::{
    needs_composite, select_by_itag, select_single, select_video_audio, verify_composite_pair,
};
pub use source::{ByteStream, HttpSource, MemorySource, StreamSource};
pub use worker::DownloadWorker;
