use std::{fmt, path::PathBuf, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

/// Where to fetch from and where to write the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source_uri: String,
    pub destination: PathBuf,
}

/// What the server answered.
///
/// The `Content-Type` travels with the outcome so the caller can pick a file
/// suffix without any side channel between header and completion handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes_written: u64,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network download capability.
///
/// Implementations write the body to `destination` only for successful
/// responses, and report non-success statuses through the outcome rather than
/// an error.
#[async_trait]
pub trait Downloader: Send + Sync + fmt::Debug {
    async fn download_file(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome>;
}

/// [`Downloader`] backed by `reqwest`, streaming the body to disk.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                CacheError::Internal(format!(
                    "Failed to create HTTP client: {e}"
                ))
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn fetch_failed(uri: &str, reason: impl fmt::Display) -> CacheError {
    CacheError::FetchFailed {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download_file(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadOutcome> {
        let uri = request.source_uri.as_str();
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| fetch_failed(uri, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        debug!(
            "download headers: uri={}, status={}, content_type={:?}",
            uri, status, content_type
        );

        if !status.is_success() {
            return Ok(DownloadOutcome {
                status: status.as_u16(),
                content_type,
                bytes_written: 0,
            });
        }

        let expected_len = response.content_length();
        let mut file = tokio::fs::File::create(&request.destination).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| fetch_failed(uri, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if let Some(content_len) = expected_len
            && written != content_len
        {
            return Err(fetch_failed(
                uri,
                format!(
                    "size mismatch: got {written} bytes, expected {content_len}"
                ),
            ));
        }

        info!(
            "downloaded {} -> {} ({} bytes)",
            uri,
            request.destination.display(),
            written
        );

        Ok(DownloadOutcome {
            status: status.as_u16(),
            content_type,
            bytes_written: written,
        })
    }
}
