//! HTTP collaborator for model acquisition.

use crate::defaults;
use crate::error::{Result, StemwerkError};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// Remote access used by the artifact store.
///
/// Swappable so the store can be exercised without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a small text document. `Ok(None)` means the server reported
    /// that the resource does not exist.
    async fn get_text(&self, url: &str) -> Result<Option<String>>;

    /// Start a binary transfer.
    async fn download(&self, url: &str) -> Result<Box<dyn Download>>;
}

/// An in-progress binary transfer.
#[async_trait]
pub trait Download: Send {
    /// Total size, when the server announces it.
    fn content_length(&self) -> Option<u64>;

    /// Next body chunk, or `None` at the end of the body.
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Timeouts for [`HttpFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetcherConfig {
    pub connect_timeout: Duration,
    /// Whole-request limit for text lookups
    pub request_timeout: Duration,
    /// Longest gap allowed between download chunks
    pub idle_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::IDLE_TIMEOUT_SECS),
        }
    }
}

/// [`Fetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

fn transport_error(url: &str, e: reqwest::Error) -> StemwerkError {
    if e.is_timeout() {
        StemwerkError::Timeout {
            message: format!("{url}: {e}"),
        }
    } else {
        StemwerkError::Network {
            message: format!("{url}: {e}"),
        }
    }
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(defaults::user_agent())
            .build()
            .map_err(|e| StemwerkError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<Option<String>> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StemwerkError::Network {
                message: format!("{url}: server returned status {status}"),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(url, e))?;
        Ok(Some(text))
    }

    async fn download(&self, url: &str) -> Result<Box<dyn Download>> {
        log::debug!("GET {} (download)", url);
        let response = tokio::time::timeout(self.config.request_timeout, self.client.get(url).send())
            .await
            .map_err(|_| StemwerkError::Timeout {
                message: format!("{url}: no response within {:?}", self.config.request_timeout),
            })?
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StemwerkError::Network {
                message: format!("{url}: download failed with status {status}"),
            });
        }

        Ok(Box::new(HttpDownload {
            url: url.to_string(),
            content_length: response.content_length(),
            idle_timeout: self.config.idle_timeout,
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
        }))
    }
}

struct HttpDownload {
    url: String,
    content_length: Option<u64>,
    idle_timeout: Duration,
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,
}

#[async_trait]
impl Download for HttpDownload {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(self.idle_timeout, self.stream.next()).await {
            Err(_) => Err(StemwerkError::Timeout {
                message: format!(
                    "{}: transfer stalled for {:?}",
                    self.url, self.idle_timeout
                ),
            }),
            Ok(None) => Ok(None),
            Ok(Some(Err(e))) => Err(transport_error(&self.url, e)),
            Ok(Some(Ok(bytes))) => Ok(Some(bytes)),
        }
    }
}

/// [`Download`] over bytes already in memory, handed out in fixed-size
/// chunks. Used by in-process fetchers.
pub struct MemoryDownload {
    data: Vec<u8>,
    offset: usize,
    chunk_size: usize,
    announce_length: bool,
}

impl MemoryDownload {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            offset: 0,
            chunk_size: 64 * 1024,
            announce_length: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Behave like a server that sends no content length.
    pub fn without_length(mut self) -> Self {
        self.announce_length = false;
        self
    }
}

#[async_trait]
impl Download for MemoryDownload {
    fn content_length(&self) -> Option<u64> {
        self.announce_length.then_some(self.data.len() as u64)
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_defaults() {
        let config = FetcherConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn http_fetcher_builds() {
        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.config().idle_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn memory_download_yields_all_bytes_in_chunks() {
        let mut download = MemoryDownload::new((0u8..10).collect()).with_chunk_size(4);
        assert_eq!(download.content_length(), Some(10));

        let mut sizes = Vec::new();
        let mut all = Vec::new();
        while let Some(chunk) = download.chunk().await.unwrap() {
            sizes.push(chunk.len());
            all.extend(chunk);
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(all, (0u8..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn memory_download_without_length() {
        let download = MemoryDownload::new(vec![1, 2, 3]).without_length();
        assert_eq!(download.content_length(), None);
    }
}
