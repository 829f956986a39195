//! Acquisition strategies: how a discovered URL becomes local files.
//!
//! # Architecture
//!
//! - [`AcquisitionStrategy`] - Async trait every fetch method implements
//! - [`StrategyRegistry`] - Ordered collection resolved by filter then max priority
//! - [`DirectFetchStrategy`] - Stateless HTTP stream (priority 0)
//! - [`DriveFileStrategy`] - One file behind an authenticated session (priority 10)
//! - [`DriveFolderStrategy`] - Folder enumeration behind a session (priority 10)
//!
//! Strategies never fail past `fetch`: a single-item failure comes back as a
//! [`DownloadResult`] with [`ResultStatus::Failed`].
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::strategy::{DirectFetchStrategy, StrategyRegistry};
//!
//! let mut registry = StrategyRegistry::new();
//! registry.register(Box::new(DirectFetchStrategy::default()));
//! let strategy = registry.resolve("https://example.com/flyer.pdf");
//! assert_eq!(strategy.map(|s| s.name()), Some("direct"));
//! ```

mod direct;
mod drive_file;
mod drive_folder;
mod registry;
pub mod session;

pub use direct::{DirectFetchStrategy, NonFetchableReason, non_fetchable_reason};
pub use drive_file::{DriveFileStrategy, SessionTimeouts, extract_file_id};
pub use drive_folder::{
    DEFAULT_MAX_DEPTH, DriveFolderStrategy, ItemKind, ItemSignals, ScrollOutcome, ScrollSettings,
    classify_item, collect_by_scrolling, extract_folder_id,
};
pub use registry::{StrategyRegistry, build_default_registry};
pub use session::{BrowserSession, CapturedDownload, SessionError, SessionResponse};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::download::DownloadError;
use crate::download::filename::resolve_unique_path;

/// Priority of the stateless fallback strategy.
pub const DIRECT_PRIORITY: i32 = 0;

/// Priority of strategies that go through an authenticated session.
pub const SESSION_PRIORITY: i32 = 10;

/// Broad family of a strategy, used for scheduling and result grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Stateless; safe to batch through the concurrency limiter.
    Direct,
    /// Single file through the shared session.
    SessionFile,
    /// Container enumeration through the shared session.
    SessionContainer,
}

impl StrategyKind {
    /// Returns true when the strategy drives the shared browser session.
    #[must_use]
    pub fn uses_session(self) -> bool {
        !matches!(self, Self::Direct)
    }
}

/// Identity of the unit a fetch belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    /// Stable unit identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Publication time, if known.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-invocation inputs to [`AcquisitionStrategy::fetch`].
pub struct DownloadContext<'a> {
    /// Directory results are written into.
    pub output_dir: PathBuf,
    /// Owning unit.
    pub post: &'a PostRef,
    /// Position of the URL within its unit, used in generated filenames.
    pub index: usize,
    /// Human label for the target, preferred over discovered names.
    pub display_name: Option<String>,
    /// Authenticated session lent by the orchestrator for this unit.
    pub session: Option<&'a mut dyn BrowserSession>,
}

impl<'a> DownloadContext<'a> {
    /// Creates a context without a session or display name.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, post: &'a PostRef, index: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            post,
            index,
            display_name: None,
            session: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Lends a session.
    #[must_use]
    pub fn with_session(mut self, session: Option<&'a mut dyn BrowserSession>) -> Self {
        self.session = session;
        self
    }
}

impl std::fmt::Debug for DownloadContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadContext")
            .field("output_dir", &self.output_dir)
            .field("post", &self.post.id)
            .field("index", &self.index)
            .field("display_name", &self.display_name)
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// Outcome of one artifact fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// File is on disk.
    Success,
    /// Nothing kept; see `error`.
    Failed,
}

/// One fetched (or failed) artifact.
///
/// Built only through [`DownloadResult::success`] and
/// [`DownloadResult::failed`], so a success always carries a path and
/// filename and a failure always carries an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadResult {
    /// Outcome.
    pub status: ResultStatus,
    /// URL the artifact was requested from.
    pub source_url: String,
    /// Final location on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Generated filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Size on disk.
    pub bytes: u64,
    /// Declared content type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Resolved extension (no dot).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Human-readable name of the source (label, discovered filename).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Path relative to the container root, for enumerated files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<PathBuf>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResult {
    /// A successful fetch stored at `local_path`.
    ///
    /// The filename is taken from the path; a path without one falls back to
    /// `file.<extension>`.
    #[must_use]
    pub fn success(
        source_url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        bytes: u64,
        content_type: Option<String>,
        extension: impl Into<String>,
    ) -> Self {
        let local_path = local_path.into();
        let extension = extension.into();
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("file.{extension}"));
        Self {
            status: ResultStatus::Success,
            source_url: source_url.into(),
            local_path: Some(local_path),
            filename: Some(filename),
            bytes,
            content_type,
            extension: Some(extension),
            source_name: None,
            relative_path: None,
            error: None,
        }
    }

    /// A failed fetch. An empty message is replaced with a generic one.
    #[must_use]
    pub fn failed(source_url: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error
        };
        Self {
            status: ResultStatus::Failed,
            source_url: source_url.into(),
            local_path: None,
            filename: None,
            bytes: 0,
            content_type: None,
            extension: None,
            source_name: None,
            relative_path: None,
            error: Some(error),
        }
    }

    /// Attaches a human-readable source name.
    #[must_use]
    pub fn with_source_name(mut self, name: Option<String>) -> Self {
        self.source_name = name;
        self
    }

    /// Attaches the container-relative path.
    #[must_use]
    pub fn with_relative_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.relative_path = Some(path.into());
        self
    }

    /// Returns true for successful fetches.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Local path when successful.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}

/// How a finished file takes its final name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Exactly `filename`, replacing what an earlier run stored there.
    Replace,
    /// `filename`, or the next `_N` name free on disk.
    Unique,
}

/// Renames a finished temp file into `dir` under `filename`.
///
/// The temp file is removed when the rename fails.
pub(crate) async fn move_into_place(
    temp_path: &Path,
    dir: &Path,
    filename: &str,
    placement: Placement,
) -> Result<PathBuf, DownloadError> {
    let final_path = match placement {
        Placement::Replace => dir.join(filename),
        Placement::Unique => resolve_unique_path(dir, filename),
    };
    if let Err(error) = tokio::fs::rename(temp_path, &final_path).await {
        let _ = tokio::fs::remove_file(temp_path).await;
        return Err(DownloadError::io(final_path, error));
    }
    Ok(final_path)
}

/// A way of acquiring the content behind a URL.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Scheduling family.
    fn kind(&self) -> StrategyKind;

    /// Higher wins when several strategies claim a URL.
    fn priority(&self) -> i32;

    /// Returns true when this strategy knows how to fetch `url`.
    fn can_handle(&self, url: &str) -> bool;

    /// Fetches `url`, returning one result per artifact.
    ///
    /// Single-file strategies return exactly one result; enumeration
    /// strategies return zero or more.
    async fn fetch(&self, url: &str, ctx: &mut DownloadContext<'_>) -> Vec<DownloadResult>;
}
