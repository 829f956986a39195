//! Authenticated-Session Multi-File Enumeration: folders on a storage service.
//!
//! Folder listings render lazily while the page scrolls, so enumeration keeps
//! scrolling until a run of consecutive rounds adds nothing new. Each entry
//! is classified as file or folder from several weak signals, nested folders
//! are walked breadth-first up to a depth limit, and every file is fetched
//! through the session's content endpoint into a directory tree that mirrors
//! the folder structure.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::DownloadError;
use crate::download::content::is_html_content_type;
use crate::download::filename::{
    claim_path, named_file, parse_content_disposition, sanitize_filename_component,
};

use super::drive_file::{SessionTimeouts, content_endpoint, resolve_session_extension, write_body};
use super::session::{COLLECT_ITEMS_SCRIPT, FOLDER_TITLE_SCRIPT, SCROLL_STEP_SCRIPT};
use super::{
    AcquisitionStrategy, BrowserSession, DownloadContext, DownloadResult, SESSION_PRIORITY,
    SessionError, StrategyKind,
};

/// MIME type the service uses for folders.
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Default nesting limit below the root folder.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Progressive-scroll termination settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSettings {
    /// Consecutive rounds without new items before stopping.
    pub idle_rounds: u32,
    /// Hard ceiling on rounds.
    pub max_rounds: u32,
    /// Pause after each scroll step so the list can render.
    pub step_delay: Duration,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            idle_rounds: 25,
            max_rounds: 400,
            step_delay: Duration::from_millis(800),
        }
    }
}

/// Raw signals gathered for one rendered folder entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemSignals {
    /// Service identifier of the entry.
    pub id: String,
    /// Visible name.
    #[serde(default)]
    pub name: Option<String>,
    /// Explicit type attribute.
    #[serde(default)]
    pub type_attr: Option<String>,
    /// Explicit target attribute.
    #[serde(default)]
    pub target_attr: Option<String>,
    /// Accessible name.
    #[serde(default)]
    pub aria_label: Option<String>,
    /// Whether a folder icon is rendered.
    #[serde(default)]
    pub has_folder_icon: bool,
    /// Outbound link.
    #[serde(default)]
    pub href: Option<String>,
    /// MIME hint.
    #[serde(default)]
    pub mime_hint: Option<String>,
}

/// What an entry turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Downloadable file.
    File,
    /// Nested folder.
    Folder,
}

/// Result of a scroll-and-collect pass.
#[derive(Debug, Clone, Default)]
pub struct ScrollOutcome {
    /// Unique entries in first-seen order.
    pub items: Vec<ItemSignals>,
    /// Collection rounds executed.
    pub rounds: u32,
    /// True when the round ceiling ended the loop.
    pub hit_ceiling: bool,
}

/// Classifies an entry by weighing every available signal.
///
/// Explicit type, target and MIME signals count double; accessible name,
/// icon, link shape and a filename extension count once. Ties go to
/// [`ItemKind::File`], since a wrongly fetched folder only costs one
/// failed result.
#[must_use]
pub fn classify_item(item: &ItemSignals) -> ItemKind {
    let lower = |value: &Option<String>| value.as_deref().map(str::to_ascii_lowercase);
    let mut folder = 0u32;
    let mut file = 0u32;

    match lower(&item.type_attr).as_deref() {
        Some("folder") => folder += 2,
        Some(t) if !t.is_empty() => file += 2,
        _ => {}
    }
    match lower(&item.target_attr).as_deref() {
        Some("folder") => folder += 2,
        Some("file" | "doc") => file += 2,
        _ => {}
    }
    match lower(&item.mime_hint).as_deref() {
        Some(FOLDER_MIME) => folder += 2,
        Some(m) if !m.is_empty() => file += 2,
        _ => {}
    }
    if let Some(label) = lower(&item.aria_label) {
        if label.contains("folder") {
            folder += 1;
        } else if !label.is_empty() {
            file += 1;
        }
    }
    if item.has_folder_icon {
        folder += 1;
    }
    if let Some(href) = lower(&item.href) {
        if href.contains("/folders/") || href.contains("folderview") {
            folder += 1;
        } else if href.contains("/file/d/") || href.contains("/document/d/") {
            file += 1;
        }
    }
    if item
        .name
        .as_deref()
        .and_then(crate::download::filename::extension_of)
        .is_some()
    {
        file += 1;
    }

    if folder > file {
        ItemKind::Folder
    } else {
        ItemKind::File
    }
}

/// Extracts the folder id from a storage-service folder URL.
///
/// Accepts `/drive/folders/<id>`, `/drive/u/<n>/folders/<id>` and
/// `folderview?id=<id>`.
#[must_use]
pub fn extract_folder_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.host_str()?.to_ascii_lowercase() != "drive.google.com" {
        return None;
    }
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    if let Some(pos) = segments.iter().position(|s| *s == "folders") {
        return segments.get(pos + 1).map(|id| (*id).to_string());
    }
    if segments.as_slice() == ["folderview"] {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty());
    }
    None
}

fn folder_url(folder_id: &str) -> String {
    format!(
        "https://drive.google.com/drive/folders/{}",
        urlencoding::encode(folder_id)
    )
}

fn file_view_url(file_id: &str) -> String {
    format!(
        "https://drive.google.com/file/d/{}/view",
        urlencoding::encode(file_id)
    )
}

/// Scrolls the open listing, accumulating unique entries.
///
/// Stops after `idle_rounds` consecutive rounds that add no new id, or at
/// `max_rounds`. A single empty round never ends the loop on its own.
///
/// # Errors
///
/// Returns the [`SessionError`] of a failed script evaluation.
pub async fn collect_by_scrolling(
    session: &mut dyn BrowserSession,
    settings: &ScrollSettings,
) -> Result<ScrollOutcome, SessionError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut outcome = ScrollOutcome::default();
    let mut idle = 0u32;

    loop {
        outcome.rounds += 1;
        let value = session.evaluate(COLLECT_ITEMS_SCRIPT).await?;
        let batch: Vec<ItemSignals> = if value.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(value).map_err(|e| SessionError::script(e.to_string()))?
        };

        let before = outcome.items.len();
        for item in batch {
            if !item.id.is_empty() && seen.insert(item.id.clone()) {
                outcome.items.push(item);
            }
        }
        let added = outcome.items.len() - before;
        if added == 0 {
            idle += 1;
        } else {
            idle = 0;
        }
        debug!(
            round = outcome.rounds,
            added,
            total = outcome.items.len(),
            idle,
            "scroll round"
        );

        if idle >= settings.idle_rounds {
            break;
        }
        if outcome.rounds >= settings.max_rounds {
            warn!(
                rounds = outcome.rounds,
                items = outcome.items.len(),
                "scroll ceiling reached, listing may be incomplete"
            );
            outcome.hit_ceiling = true;
            break;
        }

        session.evaluate(SCROLL_STEP_SCRIPT).await?;
        if !settings.step_delay.is_zero() {
            tokio::time::sleep(settings.step_delay).await;
        }
    }

    Ok(outcome)
}

/// A folder waiting to be listed.
struct PendingFolder {
    id: String,
    relative: PathBuf,
    depth: usize,
}

/// A file found during enumeration.
struct Leaf {
    id: String,
    name: Option<String>,
    mime_hint: Option<String>,
    relative: PathBuf,
}

/// Folder enumeration through an authenticated session.
#[derive(Debug, Clone)]
pub struct DriveFolderStrategy {
    timeouts: SessionTimeouts,
    scroll: ScrollSettings,
    max_depth: usize,
}

impl Default for DriveFolderStrategy {
    fn default() -> Self {
        Self::new(
            SessionTimeouts::default(),
            ScrollSettings::default(),
            DEFAULT_MAX_DEPTH,
        )
    }
}

impl DriveFolderStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new(timeouts: SessionTimeouts, scroll: ScrollSettings, max_depth: usize) -> Self {
        Self {
            timeouts,
            scroll,
            max_depth,
        }
    }

    /// Lists the folder tree under `root_id`, breadth-first.
    ///
    /// Folder-level failures become failed results; the walk continues.
    async fn enumerate(
        &self,
        session: &mut dyn BrowserSession,
        root_id: &str,
        failures: &mut Vec<DownloadResult>,
    ) -> Vec<Leaf> {
        let mut leaves = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([PendingFolder {
            id: root_id.to_string(),
            relative: PathBuf::new(),
            depth: 0,
        }]);

        while let Some(folder) = queue.pop_front() {
            if !visited.insert(folder.id.clone()) {
                continue;
            }
            let url = folder_url(&folder.id);
            if folder.depth > 0
                && let Err(error) = session.navigate(&url, self.timeouts.navigation).await
            {
                warn!(folder = %folder.id, error = %error, "could not open nested folder");
                failures.push(DownloadResult::failed(
                    &url,
                    DownloadError::session(&url, error).to_string(),
                ));
                continue;
            }

            let listing = match collect_by_scrolling(session, &self.scroll).await {
                Ok(listing) => listing,
                Err(error) => {
                    failures.push(DownloadResult::failed(
                        &url,
                        DownloadError::session(&url, error).to_string(),
                    ));
                    continue;
                }
            };
            debug!(
                folder = %folder.id,
                depth = folder.depth,
                items = listing.items.len(),
                "folder listed"
            );

            for item in listing.items {
                let label = item.name.clone().unwrap_or_else(|| item.id.clone());
                match classify_item(&item) {
                    ItemKind::Folder if folder.depth < self.max_depth => {
                        queue.push_back(PendingFolder {
                            relative: folder.relative.join(sanitize_or(&label, &item.id)),
                            id: item.id,
                            depth: folder.depth + 1,
                        });
                    }
                    ItemKind::Folder => {
                        info!(
                            folder = %item.id,
                            max_depth = self.max_depth,
                            "skipping folder beyond depth limit"
                        );
                    }
                    ItemKind::File => leaves.push(Leaf {
                        id: item.id,
                        name: item.name,
                        mime_hint: item.mime_hint,
                        relative: folder.relative.clone(),
                    }),
                }
            }
        }

        leaves
    }

    async fn fetch_leaf(
        &self,
        session: &mut dyn BrowserSession,
        leaf: &Leaf,
        container_dir: &Path,
        claimed: &mut HashSet<PathBuf>,
    ) -> DownloadResult {
        let source_url = file_view_url(&leaf.id);
        let endpoint = content_endpoint(&leaf.id);

        let response = match session.fetch_bytes(&endpoint, self.timeouts.fetch).await {
            Ok(response) => response,
            Err(error) => {
                return DownloadResult::failed(
                    &source_url,
                    DownloadError::session(&source_url, error).to_string(),
                );
            }
        };
        if !response.is_success() {
            return DownloadResult::failed(
                &source_url,
                DownloadError::http_status(&endpoint, response.status).to_string(),
            );
        }
        if response
            .content_type
            .as_deref()
            .is_some_and(is_html_content_type)
        {
            return DownloadResult::failed(
                &source_url,
                DownloadError::unwanted(&source_url, "content endpoint answered with an HTML page")
                    .to_string(),
            );
        }

        let disposition_name = response
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition);
        let extension = resolve_session_extension(
            response.content_type.as_deref(),
            &[leaf.name.as_deref(), disposition_name.as_deref()],
            leaf.mime_hint.as_deref(),
        );
        let stem = leaf
            .name
            .clone()
            .or(disposition_name)
            .unwrap_or_else(|| leaf.id.clone());
        let filename = named_file(&stem, &extension);
        let path = claim_path(&container_dir.join(&leaf.relative), &filename, claimed);

        match write_body(&path, &response.body).await {
            Ok(()) => {
                let relative = leaf.relative.join(
                    path.file_name()
                        .map_or_else(|| PathBuf::from(&filename), PathBuf::from),
                );
                DownloadResult::success(
                    &source_url,
                    path,
                    response.body.len() as u64,
                    response.content_type.clone(),
                    extension,
                )
                .with_source_name(leaf.name.clone())
                .with_relative_path(relative)
            }
            Err(error) => DownloadResult::failed(&source_url, error.to_string()),
        }
    }
}

fn sanitize_or(name: &str, fallback: &str) -> String {
    let clean = sanitize_filename_component(name);
    if clean.is_empty() {
        sanitize_filename_component(fallback)
    } else {
        clean
    }
}

#[async_trait]
impl AcquisitionStrategy for DriveFolderStrategy {
    fn name(&self) -> &'static str {
        "drive_folder"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::SessionContainer
    }

    fn priority(&self) -> i32 {
        SESSION_PRIORITY
    }

    fn can_handle(&self, url: &str) -> bool {
        extract_folder_id(url).is_some()
    }

    #[instrument(skip(self, ctx), fields(strategy = "drive_folder", post = %ctx.post.id))]
    async fn fetch(&self, url: &str, ctx: &mut DownloadContext<'_>) -> Vec<DownloadResult> {
        let Some(root_id) = extract_folder_id(url) else {
            return vec![DownloadResult::failed(url, "not a storage-service folder URL")];
        };
        let Some(session) = ctx.session.as_deref_mut() else {
            let error = DownloadError::session(url, SessionError::Unavailable);
            return vec![DownloadResult::failed(url, error.to_string())];
        };

        if let Err(error) = session
            .navigate(&folder_url(&root_id), self.timeouts.navigation)
            .await
        {
            return vec![DownloadResult::failed(
                url,
                DownloadError::session(url, error).to_string(),
            )];
        }
        let title = match session.evaluate(FOLDER_TITLE_SCRIPT).await {
            Ok(value) => value.as_str().map(str::to_string),
            Err(error) => {
                debug!(error = %error, "folder title unavailable");
                None
            }
        };
        let container_name = ctx
            .display_name
            .clone()
            .or(title)
            .unwrap_or_else(|| format!("folder_{root_id}"));
        let container_dir = ctx
            .output_dir
            .join(sanitize_or(&container_name, &format!("folder_{root_id}")));

        let mut results = Vec::new();
        let leaves = self.enumerate(session, &root_id, &mut results).await;
        info!(files = leaves.len(), container = %container_dir.display(), "folder enumerated");

        // Same-named siblings get `_N` names; files from earlier runs are replaced.
        let mut claimed = HashSet::new();
        for leaf in &leaves {
            results.push(self.fetch_leaf(session, leaf, &container_dir, &mut claimed).await);
        }
        results
    }
}
