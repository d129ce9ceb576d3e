use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{ByteStream, StreamSource};
use crate::error::DownloadError;
use crate::format::{Format, Video};

#[derive(Debug, Clone)]
enum Behavior {
    Serve,
    FailOpen,
    /// Deliver this many bytes, then fail with a connection reset.
    FailAfter(usize),
    /// Deliver this many bytes, then never yield again.
    StallAfter(usize),
}

#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    declared_len: u64,
    behavior: Behavior,
}

/// In-memory source serving fixed payloads per itag.
///
/// Used for offline runs and tests; every call to `open_stream` is recorded.
#[derive(Debug)]
pub struct MemorySource {
    videos: HashMap<String, Video>,
    entries: HashMap<u32, Entry>,
    chunk_size: usize,
    opened: Mutex<Vec<u32>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            videos: HashMap::new(),
            entries: HashMap::new(),
            chunk_size: 16 * 1024,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_video(mut self, video: Video) -> Self {
        self.videos.insert(video.id.clone(), video);
        self
    }

    /// Serve `payload` for `itag`, declaring its exact length.
    pub fn with_payload(self, itag: u32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let declared_len = payload.len() as u64;
        self.with_entry(itag, payload, declared_len, Behavior::Serve)
    }

    /// Serve `payload` for `itag` without declaring a length.
    pub fn with_unsized_payload(self, itag: u32, payload: impl Into<Bytes>) -> Self {
        self.with_entry(itag, payload.into(), 0, Behavior::Serve)
    }

    pub fn with_open_failure(self, itag: u32) -> Self {
        self.with_entry(itag, Bytes::new(), 0, Behavior::FailOpen)
    }

    pub fn with_failure_after(self, itag: u32, payload: impl Into<Bytes>, after: usize) -> Self {
        let payload = payload.into();
        let declared_len = payload.len() as u64;
        self.with_entry(itag, payload, declared_len, Behavior::FailAfter(after))
    }

    pub fn with_stall_after(self, itag: u32, payload: impl Into<Bytes>, after: usize) -> Self {
        let payload = payload.into();
        let declared_len = payload.len() as u64;
        self.with_entry(itag, payload, declared_len, Behavior::StallAfter(after))
    }

    fn with_entry(
        mut self,
        itag: u32,
        payload: Bytes,
        declared_len: u64,
        behavior: Behavior,
    ) -> Self {
        self.entries.insert(
            itag,
            Entry {
                payload,
                declared_len,
                behavior,
            },
        );
        self
    }

    /// Itags opened so far, in call order.
    pub fn opened(&self) -> Vec<u32> {
        self.opened.lock().clone()
    }

    fn chunks(&self, payload: &Bytes, limit: usize) -> Vec<Result<Bytes, DownloadError>> {
        let limit = limit.min(payload.len());
        (0..limit)
            .step_by(self.chunk_size)
            .map(|start| Ok(payload.slice(start..(start + self.chunk_size).min(limit))))
            .collect()
    }
}

#[async_trait]
impl StreamSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_video(&self, id: &str) -> Result<Video, DownloadError> {
        self.videos
            .get(id)
            .cloned()
            .ok_or_else(|| DownloadError::catalog(format!("unknown video `{id}`")))
    }

    async fn open_stream(
        &self,
        token: &CancellationToken,
        _video: &Video,
        format: &Format,
    ) -> Result<(ByteStream, u64), DownloadError> {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        self.opened.lock().push(format.itag);

        let entry = self.entries.get(&format.itag).ok_or_else(|| {
            DownloadError::stream_open(format!("no payload for itag {}", format.itag))
        })?;

        let stream: ByteStream = match entry.behavior {
            Behavior::Serve => stream::iter(self.chunks(&entry.payload, usize::MAX)).boxed(),
            Behavior::FailOpen => {
                return Err(DownloadError::stream_open(format!(
                    "itag {} refused to open",
                    format.itag
                )));
            }
            Behavior::FailAfter(after) => {
                let reset = Err(DownloadError::Transfer {
                    source: io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ),
                });
                stream::iter(self.chunks(&entry.payload, after))
                    .chain(stream::once(async move { reset }))
                    .boxed()
            }
            Behavior::StallAfter(after) => stream::iter(self.chunks(&entry.payload, after))
                .chain(stream::pending())
                .boxed(),
        };

        Ok((stream, entry.declared_len))
    }
}
