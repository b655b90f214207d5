//! HTTP client for attachment downloads
//!
//! Streams response bodies straight to disk so large order PDFs never sit
//! fully in memory.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, header::{HeaderMap, HeaderValue, USER_AGENT}};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::application::attachment_acquirer::{AttachmentFetcher, FetchError};

/// HTTP client configuration for downloads
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "records-sync/0.1".to_string(),
            timeout_seconds: 60,
            follow_redirects: true,
        }
    }
}

/// Download client; pacing lives in the acquirer so it can be shared across workers
pub struct HttpClient {
    client: Client,
    cancellation: CancellationToken,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::Transport(format!("invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            cancellation: CancellationToken::new(),
        })
    }

    /// Abort in-flight downloads when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    async fn stream_to_file(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        tracing::debug!("Fetching attachment: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut body = response.bytes_stream();
        let mut written = 0_u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::Transport(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!("Fetched {} bytes from {}", written, url);
        Ok(written)
    }
}

#[async_trait]
impl AttachmentFetcher for HttpClient {
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        if self.cancellation.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            result = self.stream_to_file(url, destination) => result,
            () = self.cancellation.cancelled() => {
                tracing::warn!("🛑 Download cancelled for URL: {}", url);
                Err(FetchError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_creation() {
        let client = HttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn invalid_user_agent_rejected() {
        let config = HttpClientConfig {
            user_agent: "bad\nagent".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpClient::new(config), Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn cancelled_client_never_touches_network() {
        let token = CancellationToken::new();
        token.cancel();
        let client = HttpClient::new(HttpClientConfig::default())
            .unwrap()
            .with_cancellation(token);

        let dir = tempfile::tempdir().unwrap();
        let result = client
            .download("http://127.0.0.1:9/never.pdf", &dir.path().join("never.pdf"))
            .await;

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(!dir.path().join("never.pdf").exists());
    }
}
