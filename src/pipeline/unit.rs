//! Units of work and their aggregated outcomes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::content::is_video_extension;
use crate::download::filename::{sanitize_filename_component, slugify};
use crate::manifest::PostStatus;
use crate::strategy::{DownloadResult, NonFetchableReason, PostRef, StrategyKind};

/// Longest title slug used in unit directory names.
const MAX_SLUG_CHARS: usize = 60;

/// Where a candidate URL was found in the unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    /// Inline in the post body (images, embedded links).
    #[default]
    ContentBody,
    /// Listed as an attachment.
    AttachmentList,
}

/// A URL discovered in a unit, with an optional human label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrl {
    /// Raw URL as discovered.
    pub url: String,
    /// Display label (link text, attachment name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Discovery location.
    #[serde(default)]
    pub source: UrlSource,
}

impl CandidateUrl {
    /// A body URL without a label.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
            source: UrlSource::ContentBody,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Marks the URL as coming from the attachment list.
    #[must_use]
    pub fn attachment(mut self) -> Self {
        self.source = UrlSource::AttachmentList;
        self
    }
}

/// One post (or comparable record) and the URLs found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveUnit {
    /// Stable identifier.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Canonical URL of the post.
    #[serde(default)]
    pub url: String,
    /// Publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Candidate URLs in discovery order.
    #[serde(default)]
    pub candidates: Vec<CandidateUrl>,
}

impl ArchiveUnit {
    /// Identity handed to strategies.
    #[must_use]
    pub fn post_ref(&self) -> PostRef {
        PostRef {
            id: self.id.clone(),
            title: self.title.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Directory name: `<YYYY-MM-DD|undated>_<title slug, or id>`.
    #[must_use]
    pub fn directory_name(&self) -> String {
        let date = self
            .timestamp
            .map_or_else(|| "undated".to_string(), |ts| ts.format("%Y-%m-%d").to_string());
        let mut slug = slugify(&self.title, MAX_SLUG_CHARS);
        if slug.is_empty() {
            slug = sanitize_filename_component(&self.id);
        }
        if slug.is_empty() {
            slug = "unit".to_string();
        }
        format!("{date}_{slug}")
    }
}

/// Output directory of `unit` under `output_dir`.
#[must_use]
pub fn unit_dir(output_dir: &Path, unit: &ArchiveUnit) -> PathBuf {
    output_dir.join(unit.directory_name())
}

/// Drops repeated URLs (exact string match), keeping the first occurrence.
#[must_use]
pub fn dedupe_candidates(candidates: &[CandidateUrl]) -> Vec<CandidateUrl> {
    let mut seen: HashSet<&str> = HashSet::new();
    candidates
        .iter()
        .filter(|c| seen.insert(c.url.as_str()))
        .cloned()
        .collect()
}

/// A URL that was recorded but not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonFetchable {
    /// URL as discovered.
    pub url: String,
    /// Label, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Why it was not fetched.
    pub reason: NonFetchableReason,
}

/// What happened to one deduplicated candidate.
#[derive(Debug)]
pub(crate) enum CandidateOutcome {
    /// No strategy claimed the URL.
    Unfetchable(NonFetchableReason),
    /// A strategy ran and produced these results.
    Fetched {
        kind: StrategyKind,
        results: Vec<DownloadResult>,
    },
}

/// Everything the renderer and the caller need about a processed unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutcome {
    /// Unit identifier.
    pub unit_id: String,
    /// Final status.
    pub status: PostStatus,
    /// Successful body media.
    pub primary_media: Vec<DownloadResult>,
    /// Successful files enumerated from containers.
    pub container_media: Vec<DownloadResult>,
    /// Successful attachment files.
    pub attachments: Vec<DownloadResult>,
    /// Failed fetches, in candidate order.
    pub failures: Vec<DownloadResult>,
    /// URLs kept as links for manual review.
    pub unfetchable: Vec<NonFetchable>,
    /// Summary of what went wrong, if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitOutcome {
    /// Partitions per-candidate outcomes, preserving candidate order.
    pub(crate) fn assemble(
        unit_id: &str,
        candidates: &[CandidateUrl],
        outcomes: Vec<CandidateOutcome>,
    ) -> Self {
        let mut outcome = Self {
            unit_id: unit_id.to_string(),
            status: PostStatus::Processing,
            primary_media: Vec::new(),
            container_media: Vec::new(),
            attachments: Vec::new(),
            failures: Vec::new(),
            unfetchable: Vec::new(),
            error: None,
        };

        for (candidate, candidate_outcome) in candidates.iter().zip(outcomes) {
            match candidate_outcome {
                CandidateOutcome::Unfetchable(reason) => outcome.unfetchable.push(NonFetchable {
                    url: candidate.url.clone(),
                    label: candidate.label.clone(),
                    reason,
                }),
                CandidateOutcome::Fetched { kind, results } => {
                    for result in results {
                        if !result.is_success() {
                            outcome.failures.push(result);
                        } else if kind == StrategyKind::SessionContainer {
                            outcome.container_media.push(result);
                        } else if candidate.source == UrlSource::AttachmentList {
                            outcome.attachments.push(result);
                        } else {
                            outcome.primary_media.push(result);
                        }
                    }
                }
            }
        }

        outcome.status = outcome.acquisition_status();
        outcome.error = outcome.failure_summary();
        outcome
    }

    /// All successful results, body media first.
    pub fn successes(&self) -> impl Iterator<Item = &DownloadResult> {
        self.primary_media
            .iter()
            .chain(&self.container_media)
            .chain(&self.attachments)
    }

    /// Number of successful results.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.primary_media.len() + self.container_media.len() + self.attachments.len()
    }

    /// Successful results whose extension is a video container.
    #[must_use]
    pub fn video_count(&self) -> usize {
        self.successes()
            .filter(|r| r.extension.as_deref().is_some_and(is_video_extension))
            .count()
    }

    /// Successful non-video results.
    #[must_use]
    pub fn media_count(&self) -> usize {
        self.success_count() - self.video_count()
    }

    /// Status from acquisition alone.
    ///
    /// Complete with nothing failed or skipped; partial when something was
    /// fetched or only unfetchable links remain; failed when fetches failed
    /// and nothing succeeded.
    #[must_use]
    pub fn acquisition_status(&self) -> PostStatus {
        if self.failures.is_empty() && self.unfetchable.is_empty() {
            PostStatus::Complete
        } else if self.success_count() > 0 || self.failures.is_empty() {
            PostStatus::Partial
        } else {
            PostStatus::Failed
        }
    }

    fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() && self.unfetchable.is_empty() {
            return None;
        }
        let attempted = self.success_count() + self.failures.len();
        let mut parts = Vec::new();
        if !self.failures.is_empty() {
            parts.push(format!(
                "{} of {attempted} downloads failed",
                self.failures.len()
            ));
        }
        if !self.unfetchable.is_empty() {
            parts.push(format!(
                "{} link(s) not fetchable",
                self.unfetchable.len()
            ));
        }
        Some(parts.join("; "))
    }
}

/// Result of handing one unit to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitReport {
    /// Already complete and its output still exists.
    Skipped {
        /// Unit identifier.
        unit_id: String,
        /// Existing output artifact.
        output_path: PathBuf,
    },
    /// Processed in this run.
    Processed(UnitOutcome),
}

impl UnitReport {
    /// Unit identifier.
    #[must_use]
    pub fn unit_id(&self) -> &str {
        match self {
            Self::Skipped { unit_id, .. } => unit_id,
            Self::Processed(outcome) => &outcome.unit_id,
        }
    }

    /// Status after processing; `None` when skipped.
    #[must_use]
    pub fn status(&self) -> Option<PostStatus> {
        match self {
            Self::Skipped { .. } => None,
            Self::Processed(outcome) => Some(outcome.status),
        }
    }

    /// Returns true if the unit was skipped or ended complete.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().is_none_or(|status| status == PostStatus::Complete)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ok(url: &str, ext: &str) -> DownloadResult {
        DownloadResult::success(url, format!("/out/{ext}.{ext}"), 1, None, ext)
    }

    #[test]
    fn test_directory_name_uses_date_and_slug() {
        let unit = ArchiveUnit {
            id: "123".to_string(),
            title: "Spring Picnic: Photos!".to_string(),
            url: String::new(),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()),
            candidates: Vec::new(),
        };
        assert_eq!(unit.directory_name(), "2024-04-01_spring_picnic_photos");

        let untitled = ArchiveUnit {
            title: String::new(),
            timestamp: None,
            ..unit
        };
        assert_eq!(untitled.directory_name(), "undated_123");
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let candidates = vec![
            CandidateUrl::new("https://a.test/1").with_label("first"),
            CandidateUrl::new("https://a.test/2"),
            CandidateUrl::new("https://a.test/1").with_label("second"),
        ];
        let deduped = dedupe_candidates(&candidates);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].label.as_deref(), Some("first"));
    }

    #[test]
    fn test_assemble_partitions_and_preserves_order() {
        let candidates = vec![
            CandidateUrl::new("https://a.test/1"),
            CandidateUrl::new("mailto:x@y.z"),
            CandidateUrl::new("https://a.test/doc").attachment(),
            CandidateUrl::new("https://drive.google.com/drive/folders/F"),
        ];
        let outcomes = vec![
            CandidateOutcome::Fetched {
                kind: StrategyKind::Direct,
                results: vec![ok("https://a.test/1", "jpg")],
            },
            CandidateOutcome::Unfetchable(NonFetchableReason::MailTo),
            CandidateOutcome::Fetched {
                kind: StrategyKind::Direct,
                results: vec![ok("https://a.test/doc", "pdf")],
            },
            CandidateOutcome::Fetched {
                kind: StrategyKind::SessionContainer,
                results: vec![
                    ok("https://drive.google.com/file/d/a/view", "mp4"),
                    DownloadResult::failed("https://drive.google.com/file/d/b/view", "HTTP 500"),
                ],
            },
        ];

        let outcome = UnitOutcome::assemble("u1", &candidates, outcomes);
        assert_eq!(outcome.primary_media.len(), 1);
        assert_eq!(outcome.attachments.len(), 1);
        assert_eq!(outcome.container_media.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.unfetchable[0].reason, NonFetchableReason::MailTo);
        assert_eq!(outcome.video_count(), 1);
        assert_eq!(outcome.media_count(), 2);
        assert_eq!(outcome.status, PostStatus::Partial);
        assert_eq!(
            outcome.error.as_deref(),
            Some("1 of 4 downloads failed; 1 link(s) not fetchable")
        );
    }

    #[test]
    fn test_status_rules() {
        let empty = UnitOutcome::assemble("u", &[], Vec::new());
        assert_eq!(empty.status, PostStatus::Complete);
        assert!(empty.error.is_none());

        let candidates = vec![CandidateUrl::new("https://a.test/1")];
        let failed = UnitOutcome::assemble(
            "u",
            &candidates,
            vec![CandidateOutcome::Fetched {
                kind: StrategyKind::Direct,
                results: vec![DownloadResult::failed("https://a.test/1", "HTTP 404")],
            }],
        );
        assert_eq!(failed.status, PostStatus::Failed);

        let only_links = UnitOutcome::assemble(
            "u",
            &candidates,
            vec![CandidateOutcome::Unfetchable(NonFetchableReason::DomainRoot)],
        );
        assert_eq!(only_links.status, PostStatus::Partial);
    }

    #[test]
    fn test_unit_deserializes_with_defaults() {
        let unit: ArchiveUnit = serde_json::from_str(
            r#"{"id": "9", "candidates": [{"url": "https://a.test/x", "source": "attachment_list"}]}"#,
        )
        .unwrap();
        assert_eq!(unit.candidates[0].source, UrlSource::AttachmentList);
        assert!(unit.timestamp.is_none());
    }

    #[test]
    fn test_report_done_flags() {
        let skipped = UnitReport::Skipped {
            unit_id: "a".to_string(),
            output_path: PathBuf::from("/x"),
        };
        assert!(skipped.is_done());
        assert_eq!(skipped.unit_id(), "a");
    }
}
