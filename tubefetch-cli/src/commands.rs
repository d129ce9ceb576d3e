use std::path::PathBuf;

use humansize::{BINARY, format_size};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tubefetch_engine::{
    Downloader, DownloaderConfig, HttpConfig, Video, needs_composite, select_single,
};

use crate::error::{AppError, Result};

pub struct DownloadOptions {
    pub catalog: String,
    pub filename: Option<String>,
    pub directory: PathBuf,
    pub itag: Option<String>,
    pub quality: String,
    pub mimetype: String,
    pub ffmpeg: String,
    pub proxy: Option<String>,
    pub no_progress: bool,
    pub parallel: bool,
}

impl DownloadOptions {
    fn config(&self) -> DownloaderConfig {
        let http = HttpConfig {
            proxy: self.proxy.clone(),
            ..HttpConfig::default()
        };
        DownloaderConfig::default()
            .with_output_dir(self.directory.clone())
            .with_ffmpeg_path(self.ffmpeg.clone())
            .with_progress(!self.no_progress)
            .with_parallel_composite(self.parallel)
            .with_http(http)
    }
}

fn parse_itag(raw: &str) -> Result<u32> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("invalid itag number `{raw}`")))
}

pub async fn download(options: DownloadOptions, token: CancellationToken) -> Result<PathBuf> {
    let itag = options.itag.as_deref().map(parse_itag).transpose()?;
    let downloader = Downloader::http(options.config())?;

    let video = downloader.fetch_video(&options.catalog).await?;
    info!(
        directory = %options.directory.display(),
        title = %video.title,
        "Downloading to directory"
    );

    let output_name = options.filename.as_deref().unwrap_or_default();

    let path = if let Some(itag) = itag {
        downloader
            .download_by_itag(&token, output_name, &video, itag)
            .await?
    } else if needs_composite(&options.quality) {
        info!("Checking that ffmpeg is installed");
        downloader.probe_muxer().await?;
        downloader
            .download_composite(
                &token,
                output_name,
                &video,
                &options.quality,
                &options.mimetype,
            )
            .await?
    } else {
        let format = select_single(&video.formats, &options.quality, &options.mimetype)?;
        debug!(format = %format, "Selected format");
        downloader
            .download(&token, &video, &format, output_name)
            .await?
    };

    Ok(path)
}

pub async fn list_formats(catalog: &str) -> Result<()> {
    let downloader = Downloader::http(DownloaderConfig::default().with_progress(false))?;
    let video = downloader.fetch_video(catalog).await?;
    print_formats(&video);
    Ok(())
}

fn print_formats(video: &Video) {
    println!("{} ({})", video.title, video.id);
    if !video.author.is_empty() {
        println!("by {}", video.author);
    }
    println!();
    println!(
        "{:>6}  {:<12} {:<10} {:>6} {:>3}  {:>10}  MIME",
        "ITAG", "QUALITY", "LABEL", "KBPS", "CH", "SIZE"
    );

    for format in video.formats.sorted().iter() {
        let size = if format.content_length > 0 {
            format_size(format.content_length, BINARY)
        } else {
            "-".to_string()
        };
        println!(
            "{:>6}  {:<12} {:<10} {:>6} {:>3}  {:>10}  {}",
            format.itag,
            format.quality,
            format.quality_label,
            format.bitrate / 1000,
            format.audio_channels,
            size,
            format.mime_type
        );
    }
}
