//! HTTP client wrapper for streaming artifacts to disk.
//!
//! The client only moves bytes: it streams a response into a temporary
//! `.part` file and reports what the server declared about it. Choosing the
//! final name and extension is the caller's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, default_user_agent};
use super::error::DownloadError;
use super::filename::parse_content_disposition;

/// HTTP client for downloading files with streaming support.
///
/// Create once and clone freely; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A response body that has been written to a temporary file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// Temporary path holding the body; the caller renames or removes it.
    pub temp_path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Filename suggested by `Content-Disposition`, if any.
    pub suggested_name: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with explicit timeouts.
    ///
    /// The read timeout bounds the whole request and is the cancellation
    /// mechanism for hung transfers.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot initialize.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Streams `url` into a hidden `.part` file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails or
    /// times out, the server answers non-2xx, or writing to disk fails. The
    /// partial file is removed on stream errors.
    #[instrument(skip(self, dir), fields(url = %url))]
    pub async fn fetch_to_temp(&self, url: &str, dir: &Path) -> Result<FetchedFile, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let suggested_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);
        let final_url = response.url().to_string();

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e))?;
        let temp_path = dir.join(format!(".fetch-{}.part", temp_token()));
        let mut file = File::create(&temp_path)
            .await
            .map_err(|e| DownloadError::io(temp_path.clone(), e))?;

        let stream_result = stream_to_file(&mut file, response, url, &temp_path).await;
        if stream_result.is_err() {
            debug!(path = %temp_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        let bytes = stream_result?;

        debug!(bytes, content_type = ?content_type, "response body written");
        Ok(FetchedFile {
            temp_path,
            bytes,
            content_type,
            suggested_name,
            final_url,
        })
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

/// Unique-enough token for temp names shared by concurrent fetches in one dir.
fn temp_token() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{n}", std::process::id())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_fetch_to_temp_records_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .insert_header("Content-Disposition", r#"attachment; filename="minutes.pdf""#)
                    .set_body_bytes(b"%PDF-1.4 body".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetched = HttpClient::new()
            .fetch_to_temp(&format!("{}/doc", server.uri()), dir.path())
            .await
            .unwrap();

        assert_eq!(fetched.bytes, 13);
        assert_eq!(fetched.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(fetched.suggested_name.as_deref(), Some("minutes.pdf"));
        assert!(fetched.temp_path.exists());
        assert!(
            fetched
                .temp_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with(".part")
        );
    }

    #[tokio::test]
    async fn test_fetch_to_temp_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = HttpClient::new()
            .fetch_to_temp(&format!("{}/missing", server.uri()), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_to_temp_rejects_invalid_url() {
        let dir = TempDir::new().unwrap();
        let err = HttpClient::new()
            .fetch_to_temp("not a url", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
