//! Artifact downloader.
//!
//! Fetches image archives into the configured download directory. Retries
//! transient failures with exponential backoff between `retry_delay` and
//! `max_retry_delay`; concurrent downloads are bounded by a semaphore.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use proxy_core::config::DownloaderConfig;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

/// Attempts per download before giving up.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid url {0:?}: {1}")]
    BadUrl(String, String),

    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status} for {url}")]
    BadStatus { url: String, status: reqwest::StatusCode },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Downloader {
    download_dir: PathBuf,
    client: reqwest::Client,
    slots: Arc<Semaphore>,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl Downloader {
    pub fn new(cfg: &DownloaderConfig) -> Result<Self, DownloadError> {
        std::fs::create_dir_all(&cfg.download_dir)?;

        Ok(Self {
            download_dir: cfg.download_dir.clone(),
            client: reqwest::Client::new(),
            slots: Arc::new(Semaphore::new(cfg.max_concurrent_downloads.max(1))),
            retry_delay: cfg.retry_delay,
            max_retry_delay: cfg.max_retry_delay,
        })
    }

    /// Download `url` into the download directory and return the local path.
    ///
    /// Completes only once the file is fully on disk; callers treat the
    /// returned path as immutable input for unpacking.
    pub async fn download(&self, url: &str) -> Result<PathBuf, DownloadError> {
        let _slot = self.slots.clone().acquire_owned().await.expect("semaphore closed");

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| DownloadError::BadUrl(url.to_string(), e.to_string()))?;

        let dest = self.download_dir.join(file_name_for(&parsed));

        let mut delay = self.retry_delay;
        let mut attempt = 1;

        loop {
            match self.fetch(&parsed, &dest).await {
                Ok(()) => {
                    tracing::info!(url, dest = %dest.display(), "artifact downloaded");
                    return Ok(dest);
                }
                Err(err @ DownloadError::UnsupportedScheme(_)) => return Err(err),
                Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
                Err(err) => {
                    tracing::warn!(url, attempt, error = %err, "download failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_retry_delay);
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch(&self, url: &reqwest::Url, dest: &Path) -> Result<(), DownloadError> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url, dest).await,
            "file" => {
                tokio::fs::copy(url.path(), dest).await?;
                Ok(())
            }
            other => Err(DownloadError::UnsupportedScheme(other.to_string())),
        }
    }

    async fn fetch_http(&self, url: &reqwest::Url, dest: &Path) -> Result<(), DownloadError> {
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::BadStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }

        file.flush().await?;

        Ok(())
    }
}

/// Stable local file name for a URL: its last path segment, or a digest of
/// the whole URL when the path has none.
fn file_name_for(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| hex::encode(Sha256::digest(url.as_str().as_bytes())))
}
