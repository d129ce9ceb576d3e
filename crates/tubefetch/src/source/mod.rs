//! Stream sources: where catalogs and media bytes come from.

mod http;
mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::format::{Format, Video};

pub use http::HttpSource;
pub use memory::MemorySource;

/// A boxed stream of media chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send>>;

/// Capability interface for catalog lookup and stream opening.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    /// Load the video snapshot, including its format catalog.
    async fn fetch_video(&self, id: &str) -> Result<Video, DownloadError>;

    /// Open the byte stream of `format`.
    ///
    /// Returns the stream and its declared length, 0 when unknown. Waiting for
    /// the stream must end with [`DownloadError::Cancelled`] once `token` fires.
    async fn open_stream(
        &self,
        token: &CancellationToken,
        video: &Video,
        format: &Format,
    ) -> Result<(ByteStream, u64), DownloadError>;
}
