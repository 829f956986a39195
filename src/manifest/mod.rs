//! Durable per-collection processing state.
//!
//! One JSON file per collection records every post and avatar the pipeline
//! has touched, so an interrupted or repeated run skips finished work. The
//! file is human-readable: delete it to force a full re-run, or hand-edit one
//! record's `status` to re-process just that post.
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::manifest::{ManifestStore, PostStatus, PostUpdate};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ManifestStore::new("./archive/.manifests");
//! let mut manifest = store.load("group-42")?;
//! manifest.upsert_post("post-1", PostUpdate::status(PostStatus::Processing));
//! store.save(&mut manifest)?;
//! # Ok(())
//! # }
//! ```

mod error;
mod record;

pub use error::ManifestError;
pub use record::{
    AvatarRecord, AvatarStatus, AvatarUpdate, ManifestMetadata, PostRecord, PostStatus, PostUpdate,
};

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Processing state for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Collection-level metadata.
    pub metadata: ManifestMetadata,
    /// Post records keyed by stable post id.
    #[serde(default)]
    pub posts: BTreeMap<String, PostRecord>,
    /// Avatar records keyed by display name.
    #[serde(default)]
    pub avatars: BTreeMap<String, AvatarRecord>,
}

impl Manifest {
    /// Creates an empty manifest for `collection_id`.
    #[must_use]
    pub fn new(collection_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            metadata: ManifestMetadata {
                collection_id: collection_id.into(),
                created_at: now,
                last_run: now,
                total_posts: 0,
                schema_version: SCHEMA_VERSION,
            },
            posts: BTreeMap::new(),
            avatars: BTreeMap::new(),
        }
    }

    /// Collection identifier.
    #[must_use]
    pub fn collection_id(&self) -> &str {
        &self.metadata.collection_id
    }

    /// Returns the record for `post_id`, if any.
    #[must_use]
    pub fn post(&self, post_id: &str) -> Option<&PostRecord> {
        self.posts.get(post_id)
    }

    /// Returns true if `post_id` is recorded as complete.
    ///
    /// A complete record may point at an output file that has since been
    /// deleted; callers re-verify before skipping.
    #[must_use]
    pub fn is_complete(&self, post_id: &str) -> bool {
        self.posts
            .get(post_id)
            .is_some_and(|record| record.status == PostStatus::Complete)
    }

    /// Merges `update` into the record for `post_id`, creating it if needed.
    ///
    /// `first_downloaded` is set once and preserved; `last_updated` is always
    /// refreshed; the aggregate post count is recomputed.
    pub fn upsert_post(&mut self, post_id: &str, update: PostUpdate) -> &PostRecord {
        let now = Utc::now();
        let record = self
            .posts
            .entry(post_id.to_string())
            .or_insert_with(|| PostRecord {
                title: String::new(),
                url: String::new(),
                first_downloaded: now,
                last_updated: now,
                output_path: None,
                media_count: 0,
                video_count: 0,
                external_link_count: 0,
                status: PostStatus::Processing,
                error: None,
            });

        if let Some(title) = update.title {
            record.title = title;
        }
        if let Some(url) = update.url {
            record.url = url;
        }
        if let Some(path) = update.output_path {
            record.output_path = Some(path);
        }
        if let Some(count) = update.media_count {
            record.media_count = count;
        }
        if let Some(count) = update.video_count {
            record.video_count = count;
        }
        if let Some(count) = update.external_link_count {
            record.external_link_count = count;
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(error) = update.error {
            record.error = error;
        }
        record.last_updated = now;

        self.metadata.total_posts = self.posts.len();
        &self.posts[post_id]
    }

    /// Returns the avatar record for `display_name`, if any.
    #[must_use]
    pub fn avatar(&self, display_name: &str) -> Option<&AvatarRecord> {
        self.avatars.get(display_name)
    }

    /// Returns true if an avatar for `display_name` was already saved.
    ///
    /// Failed records return false so they are retried.
    #[must_use]
    pub fn has_avatar(&self, display_name: &str) -> bool {
        self.avatars
            .get(display_name)
            .is_some_and(|record| record.status == AvatarStatus::Complete)
    }

    /// Records the outcome of an avatar attempt for `display_name`.
    ///
    /// A stored filename survives a later update that carries none.
    pub fn upsert_avatar(&mut self, display_name: &str, update: AvatarUpdate) -> &AvatarRecord {
        let now = Utc::now();
        let filename = match self.avatars.get(display_name) {
            Some(existing) => update.filename.or_else(|| existing.filename.clone()),
            None => update.filename,
        };
        self.avatars.insert(
            display_name.to_string(),
            AvatarRecord {
                source_url: update.source_url,
                filename,
                downloaded_at: now,
                status: update.status,
                error: update.error,
            },
        );
        &self.avatars[display_name]
    }

    /// Counts posts and avatars by status.
    #[must_use]
    pub fn summary(&self) -> ManifestSummary {
        let mut summary = ManifestSummary {
            collection_id: self.metadata.collection_id.clone(),
            ..ManifestSummary::default()
        };
        for record in self.posts.values() {
            match record.status {
                PostStatus::Processing => summary.processing += 1,
                PostStatus::Complete => summary.complete += 1,
                PostStatus::Partial => summary.partial += 1,
                PostStatus::Failed => summary.failed += 1,
            }
        }
        for record in self.avatars.values() {
            match record.status {
                AvatarStatus::Complete => summary.avatars_complete += 1,
                AvatarStatus::Failed => summary.avatars_failed += 1,
            }
        }
        summary
    }
}

/// Per-status counts for a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    /// Collection identifier.
    pub collection_id: String,
    /// Posts left mid-processing.
    pub processing: usize,
    /// Complete posts.
    pub complete: usize,
    /// Partially fetched posts.
    pub partial: usize,
    /// Failed posts.
    pub failed: usize,
    /// Saved avatars.
    pub avatars_complete: usize,
    /// Failed avatars.
    pub avatars_failed: usize,
}

impl ManifestSummary {
    /// Total post records.
    #[must_use]
    pub fn total_posts(&self) -> usize {
        self.processing + self.complete + self.partial + self.failed
    }
}

impl fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} posts ({} complete, {} partial, {} failed, {} processing), {} avatars ({} failed)",
            self.collection_id,
            self.total_posts(),
            self.complete,
            self.partial,
            self.failed,
            self.processing,
            self.avatars_complete + self.avatars_failed,
            self.avatars_failed,
        )
    }
}

/// Loads and saves manifests as `<dir>/<collection>.json`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Creates a store rooted at `dir` (created lazily on first save).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Manifest file path for `collection_id`.
    ///
    /// The id is percent-encoded, so distinct ids never share a file and
    /// path separators cannot escape the store directory.
    #[must_use]
    pub fn path_for(&self, collection_id: &str) -> PathBuf {
        let name = if collection_id.is_empty() {
            "%empty".to_string()
        } else {
            urlencoding::encode(collection_id).replace('.', "%2E")
        };
        self.dir.join(format!("{name}.json"))
    }

    /// Loads the manifest for `collection_id`.
    ///
    /// A missing file yields a fresh, empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Corrupt`] when the file cannot be parsed,
    /// [`ManifestError::UnsupportedSchema`] for a newer schema,
    /// [`ManifestError::CollectionMismatch`] when the file records another
    /// collection, and [`ManifestError::Io`] for other read failures.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn load(&self, collection_id: &str) -> Result<Manifest, ManifestError> {
        let path = self.path_for(collection_id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no manifest yet, starting empty");
                return Ok(Manifest::new(collection_id));
            }
            Err(err) => return Err(ManifestError::io(path, err)),
        };

        let manifest: Manifest = serde_json::from_str(&contents).map_err(|source| {
            ManifestError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;
        if manifest.metadata.schema_version > SCHEMA_VERSION {
            return Err(ManifestError::UnsupportedSchema {
                path,
                found: manifest.metadata.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        if manifest.metadata.collection_id != collection_id {
            return Err(ManifestError::CollectionMismatch {
                path,
                expected: collection_id.to_string(),
                found: manifest.metadata.collection_id,
            });
        }

        debug!(
            posts = manifest.posts.len(),
            avatars = manifest.avatars.len(),
            "manifest loaded"
        );
        Ok(manifest)
    }

    /// Persists `manifest`, refreshing `last_run` and the post count.
    ///
    /// The document is serialized completely before anything touches the
    /// disk, written to a sibling temp file, then renamed over the old file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Serialize`] or [`ManifestError::Io`].
    #[instrument(skip(self, manifest), fields(collection = %manifest.metadata.collection_id))]
    pub fn save(&self, manifest: &mut Manifest) -> Result<(), ManifestError> {
        manifest.metadata.last_run = Utc::now();
        manifest.metadata.total_posts = manifest.posts.len();
        manifest.metadata.schema_version = SCHEMA_VERSION;

        let contents =
            serde_json::to_string_pretty(manifest).map_err(|source| ManifestError::Serialize {
                collection_id: manifest.metadata.collection_id.clone(),
                source,
            })?;

        std::fs::create_dir_all(&self.dir).map_err(|e| ManifestError::io(&self.dir, e))?;
        let path = self.path_for(&manifest.metadata.collection_id);
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents.as_bytes())
            .map_err(|e| ManifestError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, &path).map_err(|e| ManifestError::io(&path, e))?;

        debug!(path = %path.display(), posts = manifest.posts.len(), "manifest saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn full_update(status: PostStatus) -> PostUpdate {
        PostUpdate {
            title: Some("Spring picnic".to_string()),
            url: Some("https://example.com/groups/1/posts/10".to_string()),
            output_path: Some(PathBuf::from("/archive/2024-04-01_spring_picnic/post.json")),
            media_count: Some(3),
            video_count: Some(1),
            external_link_count: Some(2),
            status: Some(status),
            error: Some(None),
        }
    }

    #[test]
    fn test_upsert_creates_record_and_counts_posts() {
        let mut manifest = Manifest::new("group-1");
        manifest.upsert_post("10", full_update(PostStatus::Complete));
        manifest.upsert_post("11", PostUpdate::status(PostStatus::Processing));

        assert_eq!(manifest.metadata.total_posts, 2);
        assert!(manifest.is_complete("10"));
        assert!(!manifest.is_complete("11"));
        assert!(!manifest.is_complete("missing"));
    }

    #[test]
    fn test_upsert_preserves_first_downloaded_and_refreshes_last_updated() {
        let mut manifest = Manifest::new("group-1");
        let first = manifest
            .upsert_post("10", full_update(PostStatus::Processing))
            .clone();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let second = manifest
            .upsert_post("10", PostUpdate::status(PostStatus::Complete))
            .clone();

        assert_eq!(second.first_downloaded, first.first_downloaded);
        assert!(second.last_updated > first.last_updated);
        assert_eq!(second.status, PostStatus::Complete);
        // Fields not supplied are untouched.
        assert_eq!(second.title, "Spring picnic");
        assert_eq!(second.media_count, 3);
        assert_eq!(second.output_path, first.output_path);
    }

    #[test]
    fn test_upsert_error_can_be_set_and_cleared() {
        let mut manifest = Manifest::new("group-1");
        let update = PostUpdate {
            error: Some(Some("2 downloads failed".to_string())),
            ..PostUpdate::status(PostStatus::Partial)
        };
        assert!(manifest.upsert_post("10", update).error.is_some());

        let cleared = PostUpdate {
            error: Some(None),
            ..PostUpdate::status(PostStatus::Complete)
        };
        assert!(manifest.upsert_post("10", cleared).error.is_none());
    }

    #[test]
    fn test_avatar_dedupe_and_failed_retry_eligibility() {
        let mut manifest = Manifest::new("group-1");
        assert!(!manifest.has_avatar("Ada Lovelace"));

        manifest.upsert_avatar(
            "Ada Lovelace",
            AvatarUpdate {
                source_url: "https://cdn.example.com/a.jpg".to_string(),
                filename: None,
                status: AvatarStatus::Failed,
                error: Some("HTTP 503".to_string()),
            },
        );
        assert!(!manifest.has_avatar("Ada Lovelace"));

        manifest.upsert_avatar(
            "Ada Lovelace",
            AvatarUpdate {
                source_url: "https://cdn.example.com/a.jpg".to_string(),
                filename: Some("Ada_Lovelace.jpg".to_string()),
                status: AvatarStatus::Complete,
                error: None,
            },
        );
        assert!(manifest.has_avatar("Ada Lovelace"));
        assert_eq!(
            manifest.avatar("Ada Lovelace").unwrap().filename.as_deref(),
            Some("Ada_Lovelace.jpg")
        );
    }

    #[test]
    fn test_load_missing_file_bootstraps_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path().join("state"));
        let manifest = store.load("group-1").unwrap();
        assert_eq!(manifest.collection_id(), "group-1");
        assert!(manifest.posts.is_empty());
        assert_eq!(manifest.metadata.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut manifest = store.load("group-1").unwrap();
        manifest.upsert_post("10", full_update(PostStatus::Complete));
        manifest.upsert_avatar(
            "Grace Hopper",
            AvatarUpdate {
                source_url: "https://cdn.example.com/g.png".to_string(),
                filename: Some("Grace_Hopper.png".to_string()),
                status: AvatarStatus::Complete,
                error: None,
            },
        );
        let before = manifest.clone();

        store.save(&mut manifest).unwrap();
        let mut loaded = store.load("group-1").unwrap();

        assert!(loaded.metadata.last_run >= before.metadata.last_run);
        loaded.metadata.last_run = before.metadata.last_run;
        assert_eq!(loaded, before);
    }

    #[test]
    fn test_load_corrupt_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        std::fs::write(store.path_for("group-1"), b"{\"metadata\": oops").unwrap();

        let err = store.load("group-1").unwrap_err();
        assert!(matches!(err, ManifestError::Corrupt { .. }));
        // The file is left for the operator to inspect.
        assert!(store.path_for("group-1").exists());
    }

    #[test]
    fn test_load_newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut manifest = Manifest::new("group-1");
        store.save(&mut manifest).unwrap();

        let path = store.path_for("group-1");
        let raw = std::fs::read_to_string(&path).unwrap();
        let bumped = raw.replace("\"schema_version\": 1", "\"schema_version\": 99");
        std::fs::write(&path, bumped).unwrap();

        assert!(matches!(
            store.load("group-1"),
            Err(ManifestError::UnsupportedSchema { found: 99, .. })
        ));
    }

    #[test]
    fn test_path_for_encodes_collection_id() {
        let store = ManifestStore::new("/state");
        assert_eq!(store.path_for("group-1"), PathBuf::from("/state/group-1.json"));
        assert_eq!(
            store.path_for("../groups/42"),
            PathBuf::from("/state/%2E%2E%2Fgroups%2F42.json")
        );
        assert_ne!(store.path_for("team/alpha"), store.path_for("team_alpha"));
        assert_ne!(store.path_for(""), store.path_for("collection"));
    }

    #[test]
    fn test_similar_collection_ids_keep_separate_manifests() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut slashed = store.load("team/alpha").unwrap();
        slashed.upsert_post("p1", PostUpdate::status(PostStatus::Complete));
        store.save(&mut slashed).unwrap();

        let underscored = store.load("team_alpha").unwrap();
        assert_eq!(underscored.collection_id(), "team_alpha");
        assert!(underscored.posts.is_empty());
        assert!(store.load("team/alpha").unwrap().is_complete("p1"));
    }

    #[test]
    fn test_load_rejects_manifest_of_another_collection() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut other = Manifest::new("group-2");
        store.save(&mut other).unwrap();
        std::fs::rename(store.path_for("group-2"), store.path_for("group-1")).unwrap();

        let err = store.load("group-1").unwrap_err();
        assert!(
            matches!(
                &err,
                ManifestError::CollectionMismatch { expected, found, .. }
                    if expected == "group-1" && found == "group-2"
            ),
            "got: {err}"
        );
    }

    #[test]
    fn test_summary_counts_statuses() {
        let mut manifest = Manifest::new("group-1");
        manifest.upsert_post("a", PostUpdate::status(PostStatus::Complete));
        manifest.upsert_post("b", PostUpdate::status(PostStatus::Partial));
        manifest.upsert_post("c", PostUpdate::status(PostStatus::Failed));
        let summary = manifest.summary();
        assert_eq!(summary.total_posts(), 3);
        assert_eq!(summary.complete, 1);
        assert!(summary.to_string().starts_with("group-1: 3 posts"));
    }
}
