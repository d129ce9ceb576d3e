//! Merging of separately downloaded video and audio streams.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::DownloadError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

impl NoWindowExt for Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Multiplexes one video and one audio file into a single container.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Name of the tool (for logging and errors)
    fn name(&self) -> &str;

    /// Check that the tool can be executed at all.
    async fn probe(&self) -> Result<(), DownloadError>;

    /// Write `output` from `video` and `audio`, overwriting an existing file.
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}

/// Stream-copy merge through an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: String,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// `-y -i <video> -i <audio> -c copy -shortest <output> -loglevel warning`
    pub fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-c".into(),
            "copy".into(),
            "-shortest".into(),
            output.into(),
            "-loglevel".into(),
            "warning".into(),
        ]
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.no_window().kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: io::Error) -> DownloadError {
        if e.kind() == io::ErrorKind::NotFound {
            DownloadError::tool_missing(&self.ffmpeg_path)
        } else {
            DownloadError::Io { source: e }
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn name(&self) -> &str {
        &self.ffmpeg_path
    }

    async fn probe(&self) -> Result<(), DownloadError> {
        let status = self
            .command()
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() {
            debug!(ffmpeg = %self.ffmpeg_path, code = ?status.code(), "ffmpeg -version failed");
            return Err(DownloadError::tool_missing(&self.ffmpeg_path));
        }
        Ok(())
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let args = Self::build_args(video, audio, output);
        debug!("FFmpeg args: {:?}", args);
        info!(output = %output.display(), "Merging video and audio");

        let status = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() {
            return Err(DownloadError::MergeFailed {
                tool: self.ffmpeg_path.clone(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_args_order() {
        let args = FfmpegMuxer::build_args(
            Path::new("/tmp/youtube_1.m4v"),
            Path::new("/tmp/youtube_2.m4a"),
            Path::new("/out/clip.mp4"),
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/tmp/youtube_1.m4v",
                "-i",
                "/tmp/youtube_2.m4a",
                "-c",
                "copy",
                "-shortest",
                "/out/clip.mp4",
                "-loglevel",
                "warning",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_missing() {
        let missing = "/nonexistent/tubefetch-ffmpeg";
        let muxer = FfmpegMuxer::new(missing);

        match muxer.probe().await {
            Err(DownloadError::ToolMissing { tool }) => assert_eq!(tool, missing),
            other => panic!("expected ToolMissing, got {other:?}"),
        }

        let err = muxer
            .merge(Path::new("v"), Path::new("a"), Path::new("o"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolMissing { .. }));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        let args_file = dir.join("args.txt");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nexit {exit_code}\n",
                args_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_runs_binary_with_args() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = fake_ffmpeg(dir.path(), 0);
        let muxer = FfmpegMuxer::new(script.to_string_lossy());

        muxer.probe().await.unwrap();
        muxer
            .merge(Path::new("v.m4v"), Path::new("a.m4a"), Path::new("out.mp4"))
            .await
            .unwrap();

        let recorded = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        let recorded: Vec<&str> = recorded.lines().collect();
        assert_eq!(
            recorded,
            vec![
                "-y", "-i", "v.m4v", "-i", "a.m4a", "-c", "copy", "-shortest", "out.mp4",
                "-loglevel", "warning",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_reports_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = fake_ffmpeg(dir.path(), 3);
        let muxer = FfmpegMuxer::new(script.to_string_lossy());

        let err = muxer
            .merge(Path::new("v.m4v"), Path::new("a.m4a"), Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::MergeFailed { code: Some(3), .. }));

        // a broken install fails the probe as well
        assert!(matches!(muxer.probe().await, Err(DownloadError::ToolMissing { .. })));
    }
}
