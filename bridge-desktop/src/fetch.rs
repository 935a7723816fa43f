//! Media fetcher implementation using reqwest and tokio fs.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::fetch::MediaFetcher;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Desktop media fetcher.
///
/// Resolves `http(s)://` identifiers through a pooled reqwest client and
/// treats everything else as a local filesystem path read via tokio.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with a 30 second request timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("sound-playback-core/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    /// Create a fetcher around an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &str) -> Result<Bytes> {
        debug!(url, "fetching resource over HTTP");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BridgeError::TransferFailed(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            warn!(url, status = %response.status(), "transfer rejected");
            return Err(BridgeError::TransferFailed(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| BridgeError::TransferFailed(format!("{url}: {e}")))
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes> {
        debug!(path, "reading resource from filesystem");
        let data = tokio::fs::read(path).await?;
        Ok(Bytes::from(data))
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url).await
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            self.fetch_file(path).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reports_transfer_error() {
        let fetcher = ReqwestFetcher::new();
        let result = fetcher.fetch("/definitely/not/a/real/file.ogg").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn file_scheme_is_stripped() {
        let dir = std::env::temp_dir().join("spc-fetch-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("clip.raw");
        std::fs::write(&path, b"encoded-bytes").unwrap();

        let fetcher = ReqwestFetcher::new();
        let url = format!("file://{}", path.display());
        let data = fetcher.fetch(&url).await.unwrap();
        assert_eq!(&data[..], b"encoded-bytes");
    }
}
