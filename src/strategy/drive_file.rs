//! Authenticated-Session Single-File: one file behind a storage-service login.
//!
//! The quick path fetches the service's content endpoint from inside the
//! session. Files too large for that endpoint come back as an HTML warning
//! page instead of bytes; those go through the native export flow, which
//! confirms the warning interstitial and captures the browser download.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::content::{FALLBACK_EXTENSION, is_html_content_type};
use crate::download::filename::{build_filename, extension_of, parse_content_disposition};
use crate::download::{DownloadError, extension_from_content_type};

use super::session::{CONFIRM_DOWNLOAD_SELECTOR, FILE_META_SCRIPT};
use super::{
    AcquisitionStrategy, BrowserSession, DownloadContext, DownloadResult, Placement,
    SESSION_PRIORITY, SessionError, StrategyKind, move_into_place,
};

const DRIVE_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

/// Timeouts for session-driven flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Page navigation.
    pub navigation: Duration,
    /// Waiting for the large-file confirmation control.
    pub confirm: Duration,
    /// Waiting for a native download to finish.
    pub download_capture: Duration,
    /// In-page fetch of a content endpoint.
    pub fetch: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            confirm: Duration::from_secs(15),
            download_capture: Duration::from_secs(300),
            fetch: Duration::from_secs(300),
        }
    }
}

/// Name and type hints scraped from a file's view page.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct FileMeta {
    #[serde(default)]
    pub(super) name: Option<String>,
    #[serde(default)]
    pub(super) mime: Option<String>,
}

/// Extracts the file id from a storage-service file URL.
///
/// Accepts `/file/d/<id>/...`, `open?id=<id>` and `uc?id=<id>`.
#[must_use]
pub fn extract_file_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !DRIVE_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    if let Some(pos) = segments.windows(2).position(|w| w == ["file", "d"]) {
        return segments.get(pos + 2).map(|id| (*id).to_string());
    }
    if matches!(segments.as_slice(), ["open"] | ["uc"]) {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty());
    }
    None
}

/// Direct content endpoint for a file id.
pub(super) fn content_endpoint(file_id: &str) -> String {
    format!(
        "https://drive.google.com/uc?export=download&id={}",
        urlencoding::encode(file_id)
    )
}

fn view_url(file_id: &str) -> String {
    format!(
        "https://drive.google.com/file/d/{}/view",
        urlencoding::encode(file_id)
    )
}

/// Picks an extension from the strongest available hint.
///
/// A concrete content type wins, then an extension on any discovered name,
/// then a MIME hint, then `bin`.
pub(super) fn resolve_session_extension(
    content_type: Option<&str>,
    names: &[Option<&str>],
    mime_hint: Option<&str>,
) -> String {
    if let Some(content_type) = content_type {
        let ext = extension_from_content_type(content_type);
        if ext != FALLBACK_EXTENSION {
            return ext.to_string();
        }
    }
    if let Some(ext) = names.iter().flatten().find_map(|name| extension_of(name)) {
        return ext;
    }
    mime_hint
        .map(extension_from_content_type)
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}

/// Writes `body` to `path`, replacing any file an earlier run left there.
pub(super) async fn write_body(path: &Path, body: &[u8]) -> Result<(), DownloadError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e))?;
    }
    tokio::fs::write(path, body)
        .await
        .map_err(|e| DownloadError::io(path, e))
}

/// Single file from a session-gated storage service.
#[derive(Debug, Clone, Default)]
pub struct DriveFileStrategy {
    timeouts: SessionTimeouts,
}

impl DriveFileStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self { timeouts }
    }

    async fn load_meta(&self, session: &mut dyn BrowserSession, file_id: &str) -> FileMeta {
        if let Err(error) = session
            .navigate(&view_url(file_id), self.timeouts.navigation)
            .await
        {
            debug!(error = %error, "view page unavailable, continuing without metadata");
            return FileMeta::default();
        }
        match session.evaluate(FILE_META_SCRIPT).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(error) => {
                debug!(error = %error, "metadata script failed");
                FileMeta::default()
            }
        }
    }

    async fn fetch_endpoint(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        file_id: &str,
        target: &Target<'_>,
        meta: &FileMeta,
    ) -> Result<DownloadResult, DownloadError> {
        let endpoint = content_endpoint(file_id);
        let response = session
            .fetch_bytes(&endpoint, self.timeouts.fetch)
            .await
            .map_err(|e| DownloadError::session(url, e))?;

        if !response.is_success() {
            return Err(DownloadError::http_status(endpoint, response.status));
        }
        if response.content_type.as_deref().is_some_and(is_html_content_type) {
            return Err(DownloadError::unwanted(
                url,
                "content endpoint answered with an HTML page",
            ));
        }

        let disposition_name = response
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition);
        let extension = resolve_session_extension(
            response.content_type.as_deref(),
            &[disposition_name.as_deref(), meta.name.as_deref()],
            meta.mime.as_deref(),
        );
        let filename = build_filename(target.index, target.stem, &extension);
        let path = target.dir.join(&filename);
        write_body(&path, &response.body).await?;

        Ok(DownloadResult::success(
            url,
            path,
            response.body.len() as u64,
            response.content_type.or_else(|| meta.mime.clone()),
            extension,
        ))
    }

    async fn fetch_native(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        file_id: &str,
        target: &Target<'_>,
        meta: &FileMeta,
    ) -> Result<DownloadResult, DownloadError> {
        let session_err = |e: SessionError| DownloadError::session(url, e);

        tokio::fs::create_dir_all(target.dir)
            .await
            .map_err(|e| DownloadError::io(target.dir, e))?;
        session.arm_downloads(target.dir).await.map_err(session_err)?;
        session
            .navigate(&content_endpoint(file_id), self.timeouts.navigation)
            .await
            .map_err(session_err)?;

        if session
            .wait_for_selector(CONFIRM_DOWNLOAD_SELECTOR, self.timeouts.confirm)
            .await
            .map_err(session_err)?
        {
            debug!("confirming large-file warning");
            session
                .click(CONFIRM_DOWNLOAD_SELECTOR)
                .await
                .map_err(session_err)?;
        } else {
            debug!("no confirmation surface, waiting for download directly");
        }

        let captured = session
            .wait_for_download(self.timeouts.download_capture)
            .await
            .map_err(session_err)?
            .ok_or_else(|| session_err(SessionError::timeout("download event")))?;

        let bytes = tokio::fs::metadata(&captured.path)
            .await
            .map_err(|e| {
                session_err(SessionError::download_capture(format!(
                    "{}: {e}",
                    captured.path.display()
                )))
            })?
            .len();
        let extension = resolve_session_extension(
            None,
            &[captured.suggested_filename.as_deref(), meta.name.as_deref()],
            meta.mime.as_deref(),
        );
        let filename = build_filename(target.index, target.stem, &extension);
        let path =
            move_into_place(&captured.path, target.dir, &filename, Placement::Replace).await?;

        Ok(DownloadResult::success(
            url,
            path,
            bytes,
            meta.mime.clone(),
            extension,
        ))
    }
}

/// Where and under which name a file lands.
struct Target<'a> {
    dir: &'a Path,
    index: usize,
    stem: &'a str,
}

#[async_trait]
impl AcquisitionStrategy for DriveFileStrategy {
    fn name(&self) -> &'static str {
        "drive_file"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::SessionFile
    }

    fn priority(&self) -> i32 {
        SESSION_PRIORITY
    }

    fn can_handle(&self, url: &str) -> bool {
        extract_file_id(url).is_some()
    }

    #[instrument(skip(self, ctx), fields(strategy = "drive_file", post = %ctx.post.id))]
    async fn fetch(&self, url: &str, ctx: &mut DownloadContext<'_>) -> Vec<DownloadResult> {
        let Some(file_id) = extract_file_id(url) else {
            return vec![DownloadResult::failed(url, "not a storage-service file URL")];
        };
        let Some(session) = ctx.session.as_deref_mut() else {
            let error = DownloadError::session(url, SessionError::Unavailable);
            return vec![DownloadResult::failed(url, error.to_string())];
        };

        let meta = self.load_meta(session, &file_id).await;
        let stem = ctx
            .display_name
            .clone()
            .or_else(|| meta.name.clone())
            .unwrap_or_else(|| file_id.clone());
        let target = Target {
            dir: &ctx.output_dir,
            index: ctx.index,
            stem: &stem,
        };

        let result = match self
            .fetch_endpoint(session, url, &file_id, &target, &meta)
            .await
        {
            Ok(result) => Ok(result),
            Err(error) => {
                info!(error = %error, "content endpoint failed, using native download flow");
                self.fetch_native(session, url, &file_id, &target, &meta)
                    .await
            }
        };

        match result {
            Ok(result) => vec![result.with_source_name(meta.name)],
            Err(error) => {
                warn!(url, error = %error, "session file fetch failed");
                vec![DownloadResult::failed(url, error.to_string())]
            }
        }
    }
}
