//! Browser-session handle used by the authenticated strategies.
//!
//! The pipeline never owns a browser. Callers that have an authenticated page
//! open (cookie-bearing, logged in to the storage service) wrap it in a
//! [`BrowserSession`] and lend it to the orchestrator for one unit at a time.
//! Every method mutates shared navigation state, which is why session work is
//! never parallelized.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failures raised by a [`BrowserSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session was supplied for a URL that needs one.
    #[error("no authenticated browser session available")]
    Unavailable,

    /// Page navigation failed or was rejected.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// Target URL.
        url: String,
        /// Engine-reported reason.
        reason: String,
    },

    /// A script evaluated in the page failed or returned an unexpected shape.
    #[error("page script failed: {reason}")]
    Script {
        /// Engine-reported reason.
        reason: String,
    },

    /// Something the flow waits for did not show up in time.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What was awaited (selector, download event, ...).
        what: String,
    },

    /// The browser reported a download but the file could not be collected.
    #[error("download capture failed: {reason}")]
    DownloadCapture {
        /// Engine-reported reason.
        reason: String,
    },
}

impl SessionError {
    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a script error.
    pub fn script(reason: impl Into<String>) -> Self {
        Self::Script {
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }

    /// Creates a download-capture error.
    pub fn download_capture(reason: impl Into<String>) -> Self {
        Self::DownloadCapture {
            reason: reason.into(),
        }
    }
}

/// Response to an in-page authenticated fetch.
#[derive(Debug, Clone, Default)]
pub struct SessionResponse {
    /// HTTP status.
    pub status: u16,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Raw `Content-Disposition`, if any.
    pub content_disposition: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl SessionResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A file the browser saved after a native download action.
#[derive(Debug, Clone)]
pub struct CapturedDownload {
    /// Where the browser wrote the file.
    pub path: PathBuf,
    /// Filename the service suggested, if reported.
    pub suggested_filename: Option<String>,
}

/// One authenticated browser tab.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates the tab to `url`, waiting at most `timeout` for the load.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Evaluates `script` in the current page and returns its JSON result.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;

    /// Waits until `selector` matches; `Ok(false)` when it never appears.
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, SessionError>;

    /// Clicks the first element matching `selector`; `Ok(false)` if none.
    async fn click(&mut self, selector: &str) -> Result<bool, SessionError>;

    /// Fetches `url` from inside the page so session cookies apply.
    async fn fetch_bytes(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<SessionResponse, SessionError>;

    /// Routes subsequent native downloads into `dir`.
    async fn arm_downloads(&mut self, dir: &Path) -> Result<(), SessionError>;

    /// Waits for the next native download to finish.
    async fn wait_for_download(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<CapturedDownload>, SessionError>;
}

/// Returns `{ "name": ..., "mime": ... }` for a file view page.
pub const FILE_META_SCRIPT: &str = r#"(() => {
  const meta = (p) => document.querySelector(`meta[property="${p}"]`)?.content || null;
  const title = meta('og:title') || document.title.replace(/ - Google Drive$/, '');
  const mime = document.querySelector('[data-mime-type]')?.getAttribute('data-mime-type') || null;
  return { name: title || null, mime };
})()"#;

/// Returns the open folder's display name.
pub const FOLDER_TITLE_SCRIPT: &str =
    r"(() => document.title.replace(/ - Google Drive$/, '') || null)()";

/// Returns every rendered folder entry with the signals used to classify it.
pub const COLLECT_ITEMS_SCRIPT: &str = r#"(() => {
  const rows = document.querySelectorAll('[data-id]');
  return Array.from(rows).map((el) => ({
    id: el.getAttribute('data-id'),
    name: el.querySelector('[data-tooltip]')?.getAttribute('data-tooltip')
      || el.getAttribute('aria-label') || null,
    type_attr: el.getAttribute('data-type'),
    target_attr: el.getAttribute('data-target'),
    aria_label: el.getAttribute('aria-label'),
    has_folder_icon: !!el.querySelector('svg[aria-label*="older"], [data-icon="folder"]'),
    href: el.querySelector('a[href]')?.href || null,
    mime_hint: el.getAttribute('data-mime-type'),
  })).filter((item) => item.id);
})()"#;

/// Scrolls the file list one viewport down.
pub const SCROLL_STEP_SCRIPT: &str = r"(() => {
  const list = document.querySelector('[role=main] [role=grid]') || document.scrollingElement;
  list.scrollBy(0, list.clientHeight || window.innerHeight);
  return true;
})()";

/// Confirmation control on the large-file warning interstitial.
pub const CONFIRM_DOWNLOAD_SELECTOR: &str =
    "#uc-download-link, form#download-form [type=submit], a[href*='confirm=']";
