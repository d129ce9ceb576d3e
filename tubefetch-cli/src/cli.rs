use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a video described by a format catalog
    Download {
        /// Catalog JSON file or http(s) URL
        catalog: String,

        /// The output file, generated from the video title by default
        #[arg(short = 'o', long)]
        filename: Option<String>,

        /// The output directory
        #[arg(short = 'd', long, default_value = ".")]
        directory: PathBuf,

        /// Itag number of the stream
        #[arg(short = 'i', long)]
        itag: Option<String>,

        /// Quality name or label, e.g. medium, hd1080 or 1080p; hd* merges video and audio
        #[arg(short = 'q', long, default_value = "")]
        quality: String,

        /// Mime type filter, e.g. mp4 or webm
        #[arg(short = 'm', long, default_value = "")]
        mimetype: String,

        /// Path to the ffmpeg binary
        #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
        ffmpeg: String,

        /// Proxy for all requests (http, https or socks5)
        #[arg(long)]
        proxy: Option<String>,

        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,

        /// Download video and audio streams concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// List the formats of a catalog, best first
    Formats {
        /// Catalog JSON file or http(s) URL
        catalog: String,
    },
}
