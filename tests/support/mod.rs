//! Shared fixtures for integration tests: a scripted browser session and unit builders.
//!
//! `FakeSession` answers the page scripts the session strategies evaluate with
//! canned data. Folder listings render `batch` entries at a time and grow by
//! one batch per scroll step, like a lazily loading grid. `stalls` makes the
//! grid stop growing for a number of steps once a given count is visible.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archiver_core::pipeline::{ArchiveUnit, CandidateUrl};
use archiver_core::strategy::session::{
    COLLECT_ITEMS_SCRIPT, FILE_META_SCRIPT, FOLDER_TITLE_SCRIPT, SCROLL_STEP_SCRIPT,
};
use archiver_core::strategy::{BrowserSession, CapturedDownload, SessionError, SessionResponse};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Scripted stand-in for an authenticated browser tab.
#[derive(Debug, Default)]
pub struct FakeSession {
    /// Folder listings keyed by folder URL.
    pub folders: HashMap<String, Vec<Value>>,
    /// Entries rendered per scroll step.
    pub batch: usize,
    /// `(visible, steps)`: once `visible` entries show, the next `steps`
    /// scroll steps render nothing new.
    pub stalls: Vec<(usize, u32)>,
    /// `FOLDER_TITLE_SCRIPT` result.
    pub folder_title: Option<String>,
    /// `FILE_META_SCRIPT` result.
    pub file_meta: Value,
    /// In-page fetch responses keyed by URL; anything else is a 404.
    pub responses: HashMap<String, SessionResponse>,
    /// Whether a large-file confirmation control is shown.
    pub confirm_present: bool,
    /// Bytes and suggested name for the next native download.
    pub native_download: Option<(Vec<u8>, String)>,
    /// URLs whose navigation fails.
    pub broken_urls: Vec<String>,
    /// Every call, in order.
    pub calls: Vec<String>,
    listing: Vec<Value>,
    visible: usize,
    stall_left: u32,
    download_dir: Option<PathBuf>,
}

impl FakeSession {
    /// Empty session rendering four entries per scroll step.
    pub fn new() -> Self {
        Self {
            batch: 4,
            ..Self::default()
        }
    }

    /// Adds a folder listing served at `url`.
    pub fn with_folder(mut self, url: &str, items: Vec<Value>) -> Self {
        self.folders.insert(url.to_string(), items);
        self
    }

    /// Stalls the listing for `steps` scroll steps once `visible` entries show.
    pub fn with_stall(mut self, visible: usize, steps: u32) -> Self {
        self.stalls.push((visible, steps));
        self
    }

    /// Adds an in-page fetch response.
    pub fn with_response(mut self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            SessionResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                content_disposition: None,
                body: body.to_vec(),
            },
        );
        self
    }

    /// Number of calls whose log line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// A file entry as the listing script reports it.
pub fn file_item(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "href": format!("https://drive.google.com/file/d/{id}/view"),
    })
}

/// A folder entry as the listing script reports it.
pub fn folder_item(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mime_hint": "application/vnd.google-apps.folder",
        "has_folder_icon": true,
    })
}

/// Content endpoint the session strategies fetch for `id`.
pub fn content_url(id: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={id}")
}

/// Listing URL for folder `id`.
pub fn folder_url(id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{id}")
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        self.calls.push(format!("navigate {url}"));
        if self.broken_urls.iter().any(|u| u == url) {
            return Err(SessionError::navigation(url, "net::ERR_ABORTED"));
        }
        self.listing = self.folders.get(url).cloned().unwrap_or_default();
        self.visible = self.batch.min(self.listing.len());
        self.stall_left = 0;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, SessionError> {
        if script == COLLECT_ITEMS_SCRIPT {
            self.calls.push("collect".to_string());
            Ok(Value::Array(self.listing[..self.visible].to_vec()))
        } else if script == SCROLL_STEP_SCRIPT {
            self.calls.push("scroll".to_string());
            if let Some(pos) = self.stalls.iter().position(|(at, _)| *at == self.visible) {
                self.stall_left = self.stalls.remove(pos).1;
            }
            if self.stall_left > 0 {
                self.stall_left -= 1;
            } else {
                self.visible = (self.visible + self.batch).min(self.listing.len());
            }
            Ok(Value::Bool(true))
        } else if script == FOLDER_TITLE_SCRIPT {
            self.calls.push("title".to_string());
            Ok(self.folder_title.clone().map_or(Value::Null, Value::String))
        } else if script == FILE_META_SCRIPT {
            self.calls.push("meta".to_string());
            Ok(self.file_meta.clone())
        } else {
            Err(SessionError::script("unexpected script"))
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, SessionError> {
        self.calls.push(format!("wait_for {selector}"));
        Ok(self.confirm_present)
    }

    async fn click(&mut self, selector: &str) -> Result<bool, SessionError> {
        self.calls.push(format!("click {selector}"));
        Ok(self.confirm_present)
    }

    async fn fetch_bytes(
        &mut self,
        url: &str,
        _timeout: Duration,
    ) -> Result<SessionResponse, SessionError> {
        self.calls.push(format!("fetch {url}"));
        Ok(self.responses.get(url).cloned().unwrap_or(SessionResponse {
            status: 404,
            content_type: Some("text/html".to_string()),
            content_disposition: None,
            body: b"<html>not found</html>".to_vec(),
        }))
    }

    async fn arm_downloads(&mut self, dir: &Path) -> Result<(), SessionError> {
        self.calls.push("arm".to_string());
        self.download_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn wait_for_download(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<CapturedDownload>, SessionError> {
        self.calls.push("wait_download".to_string());
        let (Some(dir), Some((bytes, name))) = (&self.download_dir, self.native_download.take())
        else {
            return Ok(None);
        };
        let path = dir.join(format!(".capture-{name}"));
        std::fs::write(&path, bytes).map_err(|e| SessionError::download_capture(e.to_string()))?;
        Ok(Some(CapturedDownload {
            path,
            suggested_filename: Some(name),
        }))
    }
}

/// Builds a unit whose candidates are `urls`, in order.
pub fn unit(id: &str, title: &str, urls: &[&str]) -> ArchiveUnit {
    ArchiveUnit {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://groups.example/posts/{id}"),
        timestamp: None,
        candidates: urls.iter().map(|u| CandidateUrl::new(*u)).collect(),
    }
}
