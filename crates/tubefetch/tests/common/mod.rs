#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tubefetch_engine::{
    DownloadError, Downloader, DownloaderConfig, Format, FormatList, MemorySource, Muxer, Video,
};

#[derive(Debug, Clone)]
pub struct MergeCall {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub video_bytes: Vec<u8>,
    pub audio_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerBehavior {
    Succeed,
    Missing,
    FailMerge(i32),
}

/// Records every merge and writes the concatenation of both inputs.
#[derive(Debug)]
pub struct RecordingMuxer {
    behavior: MuxerBehavior,
    probes: Mutex<usize>,
    calls: Mutex<Vec<MergeCall>>,
}

impl RecordingMuxer {
    pub fn new(behavior: MuxerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            probes: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn probes(&self) -> usize {
        *self.probes.lock()
    }

    pub fn calls(&self) -> Vec<MergeCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Muxer for RecordingMuxer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn probe(&self) -> Result<(), DownloadError> {
        *self.probes.lock() += 1;
        match self.behavior {
            MuxerBehavior::Missing => Err(DownloadError::tool_missing("ffmpeg")),
            _ => Ok(()),
        }
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let video_bytes = std::fs::read(video)?;
        let audio_bytes = std::fs::read(audio)?;
        self.calls.lock().push(MergeCall {
            video: video.to_path_buf(),
            audio: audio.to_path_buf(),
            output: output.to_path_buf(),
            video_bytes: video_bytes.clone(),
            audio_bytes: audio_bytes.clone(),
        });

        match self.behavior {
            MuxerBehavior::FailMerge(code) => Err(DownloadError::MergeFailed {
                tool: "ffmpeg".to_string(),
                code: Some(code),
            }),
            _ => {
                std::fs::write(output, [video_bytes, audio_bytes].concat())?;
                Ok(())
            }
        }
    }
}

pub fn video_only(itag: u32, mime: &str, quality: &str, width: u32, bitrate: u64) -> Format {
    Format {
        itag,
        url: format!("memory://{itag}"),
        mime_type: mime.to_string(),
        quality: quality.to_string(),
        quality_label: format!("{}p", width * 9 / 16),
        bitrate,
        width,
        height: width * 9 / 16,
        fps: 30,
        ..Default::default()
    }
}

pub fn audio(itag: u32, mime: &str, bitrate: u64) -> Format {
    Format {
        itag,
        url: format!("memory://{itag}"),
        mime_type: mime.to_string(),
        quality: "tiny".to_string(),
        bitrate,
        audio_channels: 2,
        audio_sample_rate: 44100,
        ..Default::default()
    }
}

pub fn muxed(itag: u32, mime: &str, quality: &str, width: u32, bitrate: u64) -> Format {
    Format {
        audio_channels: 2,
        ..video_only(itag, mime, quality, width, bitrate)
    }
}

/// A typical catalog: two muxed formats, three video-only formats and two
/// audio formats.
pub fn sample_video() -> Video {
    Video {
        id: "BaW_jenozKc".to_string(),
        title: "Test Video".to_string(),
        author: "tester".to_string(),
        duration_secs: 10,
        formats: FormatList::new(vec![
            muxed(18, "video/mp4; codecs=\"avc1\"", "medium", 640, 500_000),
            muxed(22, "video/mp4; codecs=\"avc1\"", "hd720", 1280, 1_500_000),
            video_only(137, "video/mp4; codecs=\"avc1\"", "hd1080", 1920, 4_000_000),
            video_only(136, "video/mp4; codecs=\"avc1\"", "hd720", 1280, 2_000_000),
            video_only(248, "video/webm; codecs=\"vp9\"", "hd1080", 1920, 2_500_000),
            audio(140, "audio/mp4; codecs=\"mp4a\"", 128_000),
            audio(251, "audio/webm; codecs=\"opus\"", 160_000),
        ]),
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn config(dir: &TempDir) -> DownloaderConfig {
    DownloaderConfig::default()
        .with_output_dir(dir.path())
        .with_progress(false)
}

pub fn downloader(
    config: DownloaderConfig,
    source: Arc<MemorySource>,
    muxer: Arc<RecordingMuxer>,
) -> Downloader {
    Downloader::new(config, source).with_muxer(muxer)
}

/// Names of the scratch files left in `dir`.
pub fn leftover_scratch_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with("youtube_"))
                .collect()
        })
        .unwrap_or_default()
}
