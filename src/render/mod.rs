//! Output artifacts for processed units.
//!
//! The orchestrator calls a [`DocumentRenderer`] after acquisition so the
//! artifact path lands in the same manifest write as the unit's status.
//! [`JsonRecordRenderer`] is the built-in renderer: it writes `post.json`
//! next to the unit's media.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::manifest::PostStatus;
use crate::pipeline::{ArchiveUnit, NonFetchable, UnitOutcome, unit_dir};
use crate::strategy::DownloadResult;

/// Output artifact file name inside a unit directory.
pub const RECORD_FILE_NAME: &str = "post.json";

/// Errors from writing an output artifact.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Writing the artifact failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the record failed.
    #[error("failed to serialize record for unit {unit_id}: {source}")]
    Serialize {
        /// Unit being rendered.
        unit_id: String,
        /// Serialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Turns an acquired unit into an output artifact.
pub trait DocumentRenderer: Send + Sync {
    /// Writes the artifact and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the artifact cannot be written.
    fn render(&self, unit: &ArchiveUnit, outcome: &UnitOutcome) -> Result<PathBuf, RenderError>;
}

/// Writes `<output_dir>/<unit dir>/post.json`.
#[derive(Debug, Clone)]
pub struct JsonRecordRenderer {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct PostDocument<'a> {
    id: &'a str,
    title: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    status: PostStatus,
    primary_media: Vec<MediaEntry<'a>>,
    container_media: Vec<MediaEntry<'a>>,
    attachments: Vec<MediaEntry<'a>>,
    failures: &'a [DownloadResult],
    unfetchable: &'a [NonFetchable],
    rendered_at: DateTime<Utc>,
}

/// A successful result with its path relative to the unit directory.
#[derive(Serialize)]
struct MediaEntry<'a> {
    file: String,
    #[serde(flatten)]
    result: &'a DownloadResult,
}

impl JsonRecordRenderer {
    /// Creates a renderer rooted at the archive output directory.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

fn entries<'a>(dir: &Path, results: &'a [DownloadResult]) -> Vec<MediaEntry<'a>> {
    results
        .iter()
        .map(|result| {
            let file = result
                .path()
                .map(|p| p.strip_prefix(dir).unwrap_or(p).display().to_string())
                .unwrap_or_default();
            MediaEntry { file, result }
        })
        .collect()
}

impl DocumentRenderer for JsonRecordRenderer {
    fn render(&self, unit: &ArchiveUnit, outcome: &UnitOutcome) -> Result<PathBuf, RenderError> {
        let dir = unit_dir(&self.output_dir, unit);
        let document = PostDocument {
            id: &unit.id,
            title: &unit.title,
            url: &unit.url,
            timestamp: unit.timestamp,
            status: outcome.status,
            primary_media: entries(&dir, &outcome.primary_media),
            container_media: entries(&dir, &outcome.container_media),
            attachments: entries(&dir, &outcome.attachments),
            failures: &outcome.failures,
            unfetchable: &outcome.unfetchable,
            rendered_at: Utc::now(),
        };
        let contents =
            serde_json::to_string_pretty(&document).map_err(|source| RenderError::Serialize {
                unit_id: unit.id.clone(),
                source,
            })?;

        std::fs::create_dir_all(&dir).map_err(|source| RenderError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(RECORD_FILE_NAME);
        let temp = dir.join(format!(".{RECORD_FILE_NAME}.tmp"));
        std::fs::write(&temp, contents.as_bytes()).map_err(|source| RenderError::Io {
            path: temp.clone(),
            source,
        })?;
        std::fs::rename(&temp, &path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "unit record written");
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::pipeline::CandidateUrl;
    use crate::strategy::NonFetchableReason;

    #[test]
    fn test_render_writes_record_with_relative_paths() {
        let out = TempDir::new().unwrap();
        let unit = ArchiveUnit {
            id: "42".to_string(),
            title: "Board meeting".to_string(),
            url: "https://example.com/posts/42".to_string(),
            timestamp: None,
            candidates: vec![CandidateUrl::new("https://example.com/a.pdf")],
        };
        let dir = unit_dir(out.path(), &unit);
        let outcome = UnitOutcome {
            unit_id: "42".to_string(),
            status: PostStatus::Partial,
            primary_media: vec![DownloadResult::success(
                "https://example.com/a.pdf",
                dir.join("001_a.pdf"),
                10,
                Some("application/pdf".to_string()),
                "pdf",
            )],
            container_media: Vec::new(),
            attachments: Vec::new(),
            failures: Vec::new(),
            unfetchable: vec![NonFetchable {
                url: "mailto:board@example.com".to_string(),
                label: None,
                reason: NonFetchableReason::MailTo,
            }],
            error: None,
        };

        let path = JsonRecordRenderer::new(out.path())
            .render(&unit, &outcome)
            .unwrap();
        assert_eq!(path, dir.join("post.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["primary_media"][0]["file"], "001_a.pdf");
        assert_eq!(json["primary_media"][0]["extension"], "pdf");
        assert_eq!(json["unfetchable"][0]["reason"], "mail_to");
        assert!(!dir.join(".post.json.tmp").exists());
    }
}
