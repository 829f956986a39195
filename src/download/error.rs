//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a failed
//! [`DownloadResult`](crate::strategy::DownloadResult) can report it verbatim.

use std::path::PathBuf;

use thiserror::Error;

use crate::strategy::SessionError;

/// Errors that can occur while fetching a single artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The server answered 200 with a page that is not the requested content
    /// (error page, app-store interstitial, navigation-only shell).
    #[error("unwanted content from {url}: {reason}")]
    UnwantedContent {
        /// The URL that produced the page.
        url: String,
        /// Which classifier rule matched.
        reason: String,
    },

    /// The authenticated browser session failed (expired, confirmation UI missing, ...).
    #[error("session error fetching {url}: {source}")]
    Session {
        /// The URL being fetched through the session.
        url: String,
        /// The underlying session failure.
        #[source]
        source: SessionError,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an unwanted-content error.
    pub fn unwanted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnwantedContent {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a browser session failure.
    pub fn session(url: impl Into<String>, source: SessionError) -> Self {
        Self::Session {
            url: url.into(),
            source,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: each variant needs the
// url or path, which the source errors don't carry.
