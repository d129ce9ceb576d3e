//! Composite downloads: separate video and audio streams merged into one file.

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::format::{Format, Video};
use crate::mux::Muxer;
use crate::output::resolve_output_path;
use crate::selector::{select_video_audio, verify_composite_pair};
use crate::worker::DownloadWorker;

const TEMP_PREFIX: &str = "youtube_";
const VIDEO_TEMP_SUFFIX: &str = ".m4v";
const AUDIO_TEMP_SUFFIX: &str = ".m4a";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeStage {
    Init,
    SelectingFormats,
    ProbingMuxer,
    DownloadingVideo,
    DownloadingAudio,
    /// Video and audio transferred concurrently.
    DownloadingBoth,
    Merging,
    Done,
    Failed,
}

impl CompositeStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for CompositeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::SelectingFormats => "selecting formats",
            Self::ProbingMuxer => "probing muxer",
            Self::DownloadingVideo => "downloading video",
            Self::DownloadingAudio => "downloading audio",
            Self::DownloadingBoth => "downloading video and audio",
            Self::Merging => "merging",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current stage of one composite task and the stages it went through.
/// Terminal stages are final.
#[derive(Debug)]
struct StageTracker<'a> {
    video_id: &'a str,
    stage: CompositeStage,
    visited: Vec<CompositeStage>,
}

impl<'a> StageTracker<'a> {
    fn new(video_id: &'a str) -> Self {
        Self {
            video_id,
            stage: CompositeStage::Init,
            visited: vec![CompositeStage::Init],
        }
    }

    fn enter(&mut self, next: CompositeStage) {
        if self.stage.is_terminal() {
            return;
        }
        debug!(
            video = self.video_id,
            from = %self.stage,
            to = %next,
            "Composite stage"
        );
        self.stage = next;
        self.visited.push(next);
    }
}

/// The two scratch files of a composite task, created next to the destination.
///
/// Dropping them deletes them, so an aborted task cannot leak them.
struct ScratchFiles {
    video: NamedTempFile,
    audio: NamedTempFile,
}

impl ScratchFiles {
    fn create(dir: &Path) -> Result<Self, DownloadError> {
        Ok(Self {
            video: scratch_file(dir, VIDEO_TEMP_SUFFIX)?,
            audio: scratch_file(dir, AUDIO_TEMP_SUFFIX)?,
        })
    }

    fn remove(self) {
        for file in [self.video, self.audio] {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}

fn scratch_file(dir: &Path, suffix: &str) -> Result<NamedTempFile, DownloadError> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| DownloadError::filesystem("creating temporary file", dir, e))
}

fn writable(file: &NamedTempFile) -> Result<File, DownloadError> {
    file.reopen()
        .map(File::from_std)
        .map_err(|e| DownloadError::filesystem("opening temporary file", file.path(), e))
}

/// Selects a video/audio pair, downloads both and merges them.
pub struct CompositeAssembler<'a> {
    worker: &'a DownloadWorker,
    muxer: &'a dyn Muxer,
    config: &'a DownloaderConfig,
}

impl<'a> CompositeAssembler<'a> {
    pub fn new(
        worker: &'a DownloadWorker,
        muxer: &'a dyn Muxer,
        config: &'a DownloaderConfig,
    ) -> Self {
        Self {
            worker,
            muxer,
            config,
        }
    }

    /// Download the best video and audio formats matching `quality` and
    /// `mime_type` and merge them into the destination.
    pub async fn run(
        &self,
        token: &CancellationToken,
        video: &Video,
        quality: &str,
        mime_type: &str,
        output_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        let mut stages = StageTracker::new(&video.id);
        stages.enter(CompositeStage::SelectingFormats);

        let result = match select_video_audio(&video.formats, quality, mime_type) {
            Ok((video_format, audio_format)) => {
                self.assemble(
                    &mut stages,
                    token,
                    video,
                    &video_format,
                    &audio_format,
                    output_name,
                )
                .await
            }
            Err(e) => Err(e),
        };
        Self::conclude(&mut stages, result)
    }

    /// Same as [`run`](Self::run) for an already chosen pair of formats, which
    /// must be a video-only and an audio-only format.
    pub async fn run_with_formats(
        &self,
        token: &CancellationToken,
        video: &Video,
        video_format: &Format,
        audio_format: &Format,
        output_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        let mut stages = StageTracker::new(&video.id);
        stages.enter(CompositeStage::SelectingFormats);

        let result = match verify_composite_pair(video_format, audio_format) {
            Ok(()) => {
                self.assemble(
                    &mut stages,
                    token,
                    video,
                    video_format,
                    audio_format,
                    output_name,
                )
                .await
            }
            Err(e) => Err(e),
        };
        Self::conclude(&mut stages, result)
    }

    fn conclude(
        stages: &mut StageTracker<'_>,
        result: Result<PathBuf, DownloadError>,
    ) -> Result<PathBuf, DownloadError> {
        match &result {
            Ok(_) => stages.enter(CompositeStage::Done),
            Err(e) => {
                debug!(
                    video = stages.video_id,
                    stage = %stages.stage,
                    visited = ?stages.visited,
                    error = %e,
                    "Composite download failed"
                );
                stages.enter(CompositeStage::Failed);
            }
        }
        result
    }

    async fn assemble(
        &self,
        stages: &mut StageTracker<'_>,
        token: &CancellationToken,
        video: &Video,
        video_format: &Format,
        audio_format: &Format,
        output_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        info!(
            id = %video.id,
            video_quality = %video_format.quality_label,
            video_mime = %video_format.mime_type,
            audio_mime = %audio_format.mime_type,
            "Downloading composite video"
        );

        stages.enter(CompositeStage::ProbingMuxer);
        self.muxer.probe().await?;

        let destination = resolve_output_path(
            video,
            video_format,
            output_name,
            self.config.output_dir.as_deref(),
        )?;
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let scratch = ScratchFiles::create(&dir)?;
        let result = self
            .transfer_and_merge(
                stages,
                token,
                video,
                video_format,
                audio_format,
                &scratch,
                &destination,
            )
            .await;
        scratch.remove();

        result.map(|()| destination)
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_and_merge(
        &self,
        stages: &mut StageTracker<'_>,
        token: &CancellationToken,
        video: &Video,
        video_format: &Format,
        audio_format: &Format,
        scratch: &ScratchFiles,
        destination: &Path,
    ) -> Result<(), DownloadError> {
        let mut video_file = writable(&scratch.video)?;
        let mut audio_file = writable(&scratch.audio)?;

        if self.config.parallel_composite {
            stages.enter(CompositeStage::DownloadingBoth);
            tokio::try_join!(
                self.worker
                    .copy(token, video, video_format, &mut video_file),
                self.worker
                    .copy(token, video, audio_format, &mut audio_file),
            )?;
        } else {
            stages.enter(CompositeStage::DownloadingVideo);
            self.worker
                .copy(token, video, video_format, &mut video_file)
                .await?;
            stages.enter(CompositeStage::DownloadingAudio);
            self.worker
                .copy(token, video, audio_format, &mut audio_file)
                .await?;
        }
        drop(video_file);
        drop(audio_file);

        stages.enter(CompositeStage::Merging);
        self.muxer
            .merge(scratch.video.path(), scratch.audio.path(), destination)
            .await
    }
}
