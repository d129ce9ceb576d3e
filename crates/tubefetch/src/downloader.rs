//! The download facade.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressDrawTarget};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::composite::CompositeAssembler;
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::format::{Format, Video};
use crate::mux::{FfmpegMuxer, Muxer};
use crate::output::resolve_output_path;
use crate::selector::select_by_itag;
use crate::source::{HttpSource, StreamSource};
use crate::worker::DownloadWorker;

/// Downloads single formats or merged video/audio pairs to disk.
///
/// A `Downloader` holds no per-task state; independent tasks may run on one
/// instance concurrently as long as their destinations differ.
pub struct Downloader {
    config: DownloaderConfig,
    worker: DownloadWorker,
    muxer: Arc<dyn Muxer>,
}

impl Downloader {
    pub fn new(config: DownloaderConfig, source: Arc<dyn StreamSource>) -> Self {
        let progress = if config.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let worker = DownloadWorker::new(source, progress, config.progress_tick);
        let muxer: Arc<dyn Muxer> = Arc::new(FfmpegMuxer::new(config.ffmpeg_path.clone()));

        Self {
            config,
            worker,
            muxer,
        }
    }

    /// A downloader fetching catalogs and media over HTTP.
    pub fn http(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let source = HttpSource::new(&config.http)?;
        Ok(Self::new(config, Arc::new(source)))
    }

    pub fn with_muxer(mut self, muxer: Arc<dyn Muxer>) -> Self {
        self.muxer = muxer;
        self
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Load a video and its format catalog from the source.
    pub async fn fetch_video(&self, id: &str) -> Result<Video, DownloadError> {
        self.worker.source().fetch_video(id).await
    }

    /// Download `format` of `video` to a single file.
    ///
    /// On a failed transfer the partially written destination is left in place.
    pub async fn download(
        &self,
        token: &CancellationToken,
        video: &Video,
        format: &Format,
        output_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        info!(
            id = %video.id,
            quality = %format.quality,
            mime_type = %format.mime_type,
            itag = format.itag,
            "Downloading video"
        );

        let destination = resolve_output_path(
            video,
            format,
            output_name,
            self.config.output_dir.as_deref(),
        )?;
        let mut file = tokio::fs::File::create(&destination)
            .await
            .map_err(|e| DownloadError::filesystem("creating output file", &destination, e))?;

        let copied = self.worker.copy(token, video, format, &mut file).await;
        if copied.is_err()
            && let Err(e) = file.flush().await
        {
            warn!(path = %destination.display(), error = %e, "Failed to flush partial download");
        }
        copied?;
        info!(path = %destination.display(), "Download finished");
        Ok(destination)
    }

    /// Download the format with the given itag.
    pub async fn download_by_itag(
        &self,
        token: &CancellationToken,
        output_name: &str,
        video: &Video,
        itag: u32,
    ) -> Result<PathBuf, DownloadError> {
        let format = select_by_itag(&video.formats, itag)?;
        self.download(token, video, &format, output_name).await
    }

    /// Download the best matching video and audio streams and merge them.
    pub async fn download_composite(
        &self,
        token: &CancellationToken,
        output_name: &str,
        video: &Video,
        quality: &str,
        mime_type: &str,
    ) -> Result<PathBuf, DownloadError> {
        let destination = self
            .assembler()
            .run(token, video, quality, mime_type, output_name)
            .await?;
        info!(path = %destination.display(), "Download finished");
        Ok(destination)
    }

    /// Merge an explicitly chosen video-only and audio-only format.
    pub async fn download_composite_formats(
        &self,
        token: &CancellationToken,
        output_name: &str,
        video: &Video,
        video_format: &Format,
        audio_format: &Format,
    ) -> Result<PathBuf, DownloadError> {
        let destination = self
            .assembler()
            .run_with_formats(token, video, video_format, audio_format, output_name)
            .await?;
        info!(path = %destination.display(), "Download finished");
        Ok(destination)
    }

    /// Check that the configured muxer can be run.
    pub async fn probe_muxer(&self) -> Result<(), DownloadError> {
        self.muxer.probe().await
    }

    fn assembler(&self) -> CompositeAssembler<'_> {
        CompositeAssembler::new(&self.worker, self.muxer.as_ref(), &self.config)
    }
}
