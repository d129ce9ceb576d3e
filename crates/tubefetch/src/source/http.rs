use std::io;
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use humansize::{BINARY, format_size};
use reqwest::{Client, Proxy, Url, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{ByteStream, StreamSource};
use crate::config::HttpConfig;
use crate::error::DownloadError;
use crate::format::{Format, Video};

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed a provider first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

fn build_client(config: &HttpConfig) -> Result<Client, DownloadError> {
    install_rustls_provider();

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .redirect(if config.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        });

    if let Some(proxy_url) = &config.proxy {
        let proxy = Proxy::all(proxy_url)
            .map_err(|e| DownloadError::stream_open(format!("invalid proxy `{proxy_url}`: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Catalogs are JSON documents read from disk or fetched over HTTP; media is
/// fetched from each format's URL.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            client: build_client(config)?,
        })
    }

    async fn fetch_remote_catalog(&self, url: Url) -> Result<Video, DownloadError> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| DownloadError::catalog(format!("{url}: {e}")))
    }

    async fn fetch_local_catalog(&self, path: &str) -> Result<Video, DownloadError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| DownloadError::filesystem("reading catalog", path.as_ref(), e))?;
        serde_json::from_slice(&body).map_err(|e| DownloadError::catalog(format!("{path}: {e}")))
    }
}

#[async_trait]
impl StreamSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_video(&self, id: &str) -> Result<Video, DownloadError> {
        let video = match Url::parse(id) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.fetch_remote_catalog(url).await?
            }
            _ => self.fetch_local_catalog(id).await?,
        };

        debug!(
            id = %video.id,
            title = %video.title,
            formats = video.formats.len(),
            "Catalog loaded"
        );
        Ok(video)
    }

    async fn open_stream(
        &self,
        token: &CancellationToken,
        video: &Video,
        format: &Format,
    ) -> Result<(ByteStream, u64), DownloadError> {
        if format.url.is_empty() {
            return Err(DownloadError::stream_open(format!(
                "format itag {} of video {} has no stream URL",
                format.itag, video.id
            )));
        }
        let url = Url::parse(&format.url)
            .map_err(|e| DownloadError::stream_open(format!("invalid stream URL: {e}")))?;

        debug!(itag = format.itag, url = %url, "Opening stream");

        let response = tokio::select! {
            _ = token.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(url.clone()).send() => response?,
        };

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let length = response
            .content_length()
            .filter(|len| *len > 0)
            .unwrap_or(format.content_length);

        if length > 0 {
            info!(
                itag = format.itag,
                size = %format_size(length, BINARY),
                "Stream opened"
            );
        } else {
            debug!(itag = format.itag, "Stream length not available");
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| DownloadError::Transfer {
                source: io::Error::other(e),
            })
            .boxed();
        Ok((stream, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_local_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.json");
        std::fs::write(
            &path,
            r#"{"id":"abc","title":"Local","formats":[{"itag":18,"mimeType":"video/mp4"}]}"#,
        )
        .unwrap();

        let source = HttpSource::new(&HttpConfig::default()).unwrap();
        let video = source.fetch_video(path.to_str().unwrap()).await.unwrap();
        assert_eq!(video.id, "abc");
        assert_eq!(video.formats[0].itag, 18);
    }

    #[tokio::test]
    async fn test_fetch_invalid_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();

        let source = HttpSource::new(&HttpConfig::default()).unwrap();
        let err = source
            .fetch_video(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Catalog { .. }));

        let missing = dir.path().join("missing.json");
        let err = source
            .fetch_video(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Filesystem { .. }));
    }

    #[tokio::test]
    async fn test_open_stream_without_url() {
        let source = HttpSource::new(&HttpConfig::default()).unwrap();
        let video = Video::default();
        let format = Format {
            itag: 18,
            ..Default::default()
        };
        let token = CancellationToken::new();
        let err = source
            .open_stream(&token, &video, &format)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DownloadError::StreamOpen { .. }));
    }
}
