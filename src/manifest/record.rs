//! Manifest record types and status definitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a post (unit).
///
/// `unseen` is the absence of a record. A record moves
/// `processing → {complete, partial, failed}`; `partial` and `failed` records
/// go back to `processing` on the next run, and `complete` records only when
/// their output artifact has gone missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Being worked on (or interrupted mid-unit).
    Processing,
    /// Every candidate URL was fetched and the output artifact written.
    Complete,
    /// Some artifacts were fetched, others failed or were not fetchable.
    Partial,
    /// Nothing usable was fetched, or the output artifact could not be written.
    Failed,
}

impl PostStatus {
    /// Returns the serialized string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "complete" => Ok(Self::Complete),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid post status: {s}")),
        }
    }
}

/// Outcome of an avatar download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarStatus {
    /// Image saved.
    Complete,
    /// Attempt failed; retried on a later run.
    Failed,
}

/// Collection-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Collection identifier (e.g., the group id).
    pub collection_id: String,
    /// When the manifest was first created.
    pub created_at: DateTime<Utc>,
    /// When the manifest was last saved.
    pub last_run: DateTime<Utc>,
    /// Number of post records.
    pub total_posts: usize,
    /// On-disk schema version.
    pub schema_version: u32,
}

/// Durable processing state for one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Display title.
    pub title: String,
    /// Canonical URL of the post.
    pub url: String,
    /// First time this post was processed. Never changes after creation.
    pub first_downloaded: DateTime<Utc>,
    /// Last time this record changed.
    pub last_updated: DateTime<Utc>,
    /// Rendered output artifact, once one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Successfully fetched media (non-video) artifacts.
    #[serde(default)]
    pub media_count: usize,
    /// Successfully fetched video artifacts.
    #[serde(default)]
    pub video_count: usize,
    /// Links kept as links because they were not fetchable.
    #[serde(default)]
    pub external_link_count: usize,
    /// Current status.
    pub status: PostStatus,
    /// Last error summary, cleared when a run succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields to merge into a [`PostRecord`]. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    /// New title.
    pub title: Option<String>,
    /// New canonical URL.
    pub url: Option<String>,
    /// New output artifact path.
    pub output_path: Option<PathBuf>,
    /// New media count.
    pub media_count: Option<usize>,
    /// New video count.
    pub video_count: Option<usize>,
    /// New external-link count.
    pub external_link_count: Option<usize>,
    /// New status.
    pub status: Option<PostStatus>,
    /// `Some(None)` clears the error; `Some(Some(msg))` sets it.
    pub error: Option<Option<String>>,
}

impl PostUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: PostStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Durable record of an avatar download, keyed by display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarRecord {
    /// Image URL the avatar was fetched from.
    pub source_url: String,
    /// Destination filename under the avatars directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// When the attempt finished.
    pub downloaded_at: DateTime<Utc>,
    /// Attempt outcome.
    pub status: AvatarStatus,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields to merge into an [`AvatarRecord`].
#[derive(Debug, Clone)]
pub struct AvatarUpdate {
    /// Image URL.
    pub source_url: String,
    /// Destination filename, when the attempt succeeded.
    pub filename: Option<String>,
    /// Attempt outcome.
    pub status: AvatarStatus,
    /// Failure detail.
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_post_status_round_trips_through_str() {
        for status in [
            PostStatus::Processing,
            PostStatus::Complete,
            PostStatus::Partial,
            PostStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("done".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_post_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PostStatus::Complete).unwrap(),
            "\"complete\""
        );
        assert_eq!(
            serde_json::from_str::<AvatarStatus>("\"failed\"").unwrap(),
            AvatarStatus::Failed
        );
    }

    #[test]
    fn test_post_update_status_helper() {
        let update = PostUpdate::status(PostStatus::Processing);
        assert_eq!(update.status, Some(PostStatus::Processing));
        assert!(update.title.is_none());
        assert!(update.error.is_none());
    }
}
