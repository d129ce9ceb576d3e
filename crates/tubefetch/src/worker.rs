//! Streams one format into a destination writer.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use futures::StreamExt;
use humansize::{BINARY, format_size};
use indicatif::MultiProgress;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::DownloadError;
use crate::format::{Format, Video};
use crate::progress::{ProgressRenderer, ProgressWriter};
use crate::source::{ByteStream, StreamSource};

pub struct DownloadWorker {
    source: Arc<dyn StreamSource>,
    progress: MultiProgress,
    tick: Duration,
}

impl DownloadWorker {
    pub fn new(source: Arc<dyn StreamSource>, progress: MultiProgress, tick: Duration) -> Self {
        Self {
            source,
            progress,
            tick,
        }
    }

    pub fn source(&self) -> &Arc<dyn StreamSource> {
        &self.source
    }

    /// Copy the stream of `format` into `destination` and return the number of
    /// bytes written.
    ///
    /// The destination is flushed before returning `Ok`. Nothing is retried; a
    /// failed copy leaves whatever was written in `destination`.
    #[instrument(
        skip_all,
        fields(video = %video.id, itag = format.itag, source = self.source.name()),
        level = "debug"
    )]
    pub async fn copy<W>(
        &self,
        token: &CancellationToken,
        video: &Video,
        format: &Format,
        destination: &mut W,
    ) -> Result<u64, DownloadError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (mut stream, declared_len) = self.source.open_stream(token, video, format).await?;

        let counter = Arc::new(AtomicU64::new(0));
        let mut writer = ProgressWriter::new(destination, counter.clone());
        let label = if format.is_audio() { "audio" } else { "video" };
        let renderer =
            ProgressRenderer::start(&self.progress, label, counter, declared_len, self.tick);

        match pump(token, &mut stream, &mut writer).await {
            Ok(()) => {
                let written = writer.bytes_written();
                renderer.finish().await;
                info!(
                    itag = format.itag,
                    size = %format_size(written, BINARY),
                    "Stream downloaded"
                );
                Ok(written)
            }
            Err(e) => {
                renderer.abandon().await;
                debug!(
                    itag = format.itag,
                    written = writer.bytes_written(),
                    error = %e,
                    "Stream copy aborted"
                );
                Err(e)
            }
        }
    }
}

async fn pump<W>(
    token: &CancellationToken,
    stream: &mut ByteStream,
    writer: &mut ProgressWriter<W>,
) -> Result<(), DownloadError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => writer
                .write_all(&chunk)
                .await
                .map_err(|source| DownloadError::Transfer { source })?,
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    writer
        .flush()
        .await
        .map_err(|source| DownloadError::Transfer { source })
}
