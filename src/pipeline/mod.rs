//! Acquisition orchestrator: drives units through strategies into the manifest.
//!
//! Units are processed one at a time. Within a unit, candidate URLs are
//! deduplicated and resolved; session strategies run one after another on the
//! lent browser session, then all stateless fetches run as one bounded batch.
//! The manifest is saved before and after every unit, so a crash loses at
//! most the unit in flight.
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::config::PipelineConfig;
//! use archiver_core::pipeline::{ArchiveUnit, CandidateUrl, Orchestrator};
//! use archiver_core::render::JsonRecordRenderer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let renderer = JsonRecordRenderer::new(&config.output_dir);
//! let mut orchestrator = Orchestrator::open(config, "group-42")?;
//! let unit = ArchiveUnit {
//!     id: "post-1".to_string(),
//!     title: "Flyer".to_string(),
//!     url: "https://example.com/posts/1".to_string(),
//!     timestamp: None,
//!     candidates: vec![CandidateUrl::new("https://example.com/flyer.pdf")],
//! };
//! let report = orchestrator.process_unit(&unit, None, &renderer).await?;
//! println!("{:?}", report.status());
//! # Ok(())
//! # }
//! ```

mod error;
mod unit;

pub use error::PipelineError;
pub use unit::{
    ArchiveUnit, CandidateUrl, NonFetchable, UnitOutcome, UnitReport, UrlSource,
    dedupe_candidates, unit_dir,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::download::ConcurrencyLimiter;
use crate::manifest::{
    AvatarStatus, AvatarUpdate, Manifest, ManifestError, ManifestStore, PostStatus, PostUpdate,
};
use crate::render::DocumentRenderer;
use crate::strategy::{
    AcquisitionStrategy, BrowserSession, DirectFetchStrategy, DownloadContext, DownloadResult,
    NonFetchableReason, PostRef, StrategyKind, StrategyRegistry, build_default_registry,
    non_fetchable_reason,
};

use unit::CandidateOutcome;

/// Avatar subdirectory under the output directory.
const AVATAR_DIR_NAME: &str = "avatars";

/// Outcome of [`Orchestrator::fetch_avatar`].
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarOutcome {
    /// Downloaded in this call.
    Saved(DownloadResult),
    /// Attempted in this call and failed; retried on a later run.
    Failed(DownloadResult),
    /// A complete record already exists.
    AlreadySaved,
    /// Already attempted earlier in this run.
    AlreadyAttempted,
}

/// Lends the session for one strategy call.
fn lend<'a>(
    session: &'a mut Option<&mut dyn BrowserSession>,
) -> Option<&'a mut dyn BrowserSession> {
    match session {
        Some(session) => Some(&mut **session),
        None => None,
    }
}

/// Single writer of one collection's manifest.
#[derive(Debug)]
pub struct Orchestrator {
    config: PipelineConfig,
    store: ManifestStore,
    manifest: Manifest,
    registry: StrategyRegistry,
    limiter: ConcurrencyLimiter,
    avatar_fetcher: DirectFetchStrategy,
    avatars_attempted: HashSet<String>,
}

impl Orchestrator {
    /// Opens `collection_id` with the default strategy registry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the HTTP client cannot be built, the
    /// concurrency is out of range, or the manifest cannot be loaded.
    pub fn open(config: PipelineConfig, collection_id: &str) -> Result<Self, PipelineError> {
        let client = config
            .http_client()
            .map_err(|source| PipelineError::HttpClient { source })?;
        let registry = build_default_registry(
            client,
            config.retry_policy(),
            config.html_suspect_bytes,
            config.session_timeouts(),
            config.scroll_settings(),
            config.max_folder_depth,
        );
        Self::with_registry(config, collection_id, registry)
    }

    /// Opens `collection_id` with a caller-built registry.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::open`].
    #[instrument(skip(config, registry), fields(output = %config.output_dir.display()))]
    pub fn with_registry(
        config: PipelineConfig,
        collection_id: &str,
        registry: StrategyRegistry,
    ) -> Result<Self, PipelineError> {
        let limiter = ConcurrencyLimiter::new(config.concurrency)?;
        let store = ManifestStore::new(config.state_dir());
        let manifest = store.load(collection_id)?;
        let client = config
            .http_client()
            .map_err(|source| PipelineError::HttpClient { source })?;
        let avatar_fetcher = DirectFetchStrategy::new(client, config.retry_policy())
            .with_html_suspect_bytes(config.html_suspect_bytes);

        info!(
            collection = collection_id,
            known_posts = manifest.posts.len(),
            strategies = registry.len(),
            "collection opened"
        );
        Ok(Self {
            config,
            store,
            manifest,
            registry,
            limiter,
            avatar_fetcher,
            avatars_attempted: HashSet::new(),
        })
    }

    /// Current in-memory manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The limiter used for stateless batches.
    #[must_use]
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Media directory for `unit`.
    #[must_use]
    pub fn unit_dir(&self, unit: &ArchiveUnit) -> PathBuf {
        unit_dir(&self.config.output_dir, unit)
    }

    /// Processes one unit end to end.
    ///
    /// A unit recorded complete whose output artifact still exists is
    /// skipped; if the artifact is gone, the unit is processed again.
    /// Individual fetch failures never surface as errors; they are counted
    /// in the returned outcome and reflected in the unit status.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] only when the manifest cannot be saved.
    #[instrument(skip(self, unit, session, renderer), fields(unit = %unit.id))]
    pub async fn process_unit(
        &mut self,
        unit: &ArchiveUnit,
        session: Option<&mut dyn BrowserSession>,
        renderer: &dyn DocumentRenderer,
    ) -> Result<UnitReport, ManifestError> {
        if let Some(record) = self.manifest.post(&unit.id)
            && record.status == PostStatus::Complete
        {
            match &record.output_path {
                Some(path) if path.exists() => {
                    debug!(path = %path.display(), "unit already complete, skipping");
                    return Ok(UnitReport::Skipped {
                        unit_id: unit.id.clone(),
                        output_path: path.clone(),
                    });
                }
                _ => info!("recorded output is missing, reprocessing unit"),
            }
        }

        self.manifest.upsert_post(
            &unit.id,
            PostUpdate {
                title: Some(unit.title.clone()),
                url: Some(unit.url.clone()),
                ..PostUpdate::status(PostStatus::Processing)
            },
        );
        self.store.save(&mut self.manifest)?;

        let candidates = dedupe_candidates(&unit.candidates);
        if candidates.len() < unit.candidates.len() {
            debug!(
                dropped = unit.candidates.len() - candidates.len(),
                "duplicate URLs dropped"
            );
        }
        let post = unit.post_ref();
        let dir = self.unit_dir(unit);
        let outcomes = self.acquire(&post, &candidates, &dir, session).await;
        let mut outcome = UnitOutcome::assemble(&unit.id, &candidates, outcomes);

        let output_path = match renderer.render(unit, &outcome) {
            Ok(path) => Some(path),
            Err(error) => {
                warn!(error = %error, "rendering failed");
                outcome.status = PostStatus::Failed;
                outcome.error = Some(format!("render failed: {error}"));
                None
            }
        };

        self.manifest.upsert_post(
            &unit.id,
            PostUpdate {
                output_path,
                media_count: Some(outcome.media_count()),
                video_count: Some(outcome.video_count()),
                external_link_count: Some(outcome.unfetchable.len()),
                status: Some(outcome.status),
                error: Some(outcome.error.clone()),
                ..PostUpdate::default()
            },
        );
        self.store.save(&mut self.manifest)?;

        info!(
            status = %outcome.status,
            fetched = outcome.success_count(),
            failed = outcome.failures.len(),
            unfetchable = outcome.unfetchable.len(),
            "unit processed"
        );
        Ok(UnitReport::Processed(outcome))
    }

    /// Fetches every candidate, returning one outcome per candidate in order.
    async fn acquire(
        &self,
        post: &PostRef,
        candidates: &[CandidateUrl],
        dir: &Path,
        mut session: Option<&mut dyn BrowserSession>,
    ) -> Vec<CandidateOutcome> {
        let mut slots: Vec<Option<CandidateOutcome>> = (0..candidates.len()).map(|_| None).collect();
        let mut batch: Vec<(usize, &dyn AcquisitionStrategy)> = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            let Some(strategy) = self.registry.resolve(&candidate.url) else {
                let reason =
                    non_fetchable_reason(&candidate.url).unwrap_or(NonFetchableReason::NoStrategy);
                info!(url = %candidate.url, reason = %reason, "not fetchable, keeping as link");
                slots[i] = Some(CandidateOutcome::Unfetchable(reason));
                continue;
            };
            if !strategy.kind().uses_session() {
                batch.push((i, strategy));
                continue;
            }

            // Session strategies share one tab: strictly one at a time.
            let results = {
                let mut ctx = DownloadContext::new(dir, post, i + 1)
                    .with_display_name(candidate.label.clone())
                    .with_session(lend(&mut session));
                strategy.fetch(&candidate.url, &mut ctx).await
            };
            slots[i] = Some(if results.iter().any(DownloadResult::is_success) {
                CandidateOutcome::Fetched {
                    kind: strategy.kind(),
                    results,
                }
            } else {
                self.direct_fallback(post, candidate, i + 1, dir, strategy.kind(), results)
                    .await
            });
        }

        if !batch.is_empty() {
            let fetched = self
                .limiter
                .run_batch(batch, move |(i, strategy)| {
                    let candidate = &candidates[i];
                    async move {
                        let mut ctx = DownloadContext::new(dir, post, i + 1)
                            .with_display_name(candidate.label.clone());
                        (i, strategy.fetch(&candidate.url, &mut ctx).await)
                    }
                })
                .await;
            for (i, results) in fetched {
                slots[i] = Some(CandidateOutcome::Fetched {
                    kind: StrategyKind::Direct,
                    results,
                });
            }
        }

        slots
            .into_iter()
            .zip(candidates)
            .map(|(slot, candidate)| {
                slot.unwrap_or_else(|| CandidateOutcome::Fetched {
                    kind: StrategyKind::Direct,
                    results: vec![DownloadResult::failed(&candidate.url, "not processed")],
                })
            })
            .collect()
    }

    /// Retries a URL with the stateless strategy after a session strategy
    /// produced no success.
    async fn direct_fallback(
        &self,
        post: &PostRef,
        candidate: &CandidateUrl,
        index: usize,
        dir: &Path,
        kind: StrategyKind,
        session_results: Vec<DownloadResult>,
    ) -> CandidateOutcome {
        let Some(direct) = self.registry.direct_fallback(&candidate.url) else {
            return CandidateOutcome::Fetched {
                kind,
                results: session_results,
            };
        };

        info!(url = %candidate.url, "session strategy fetched nothing, trying direct fetch");
        let mut ctx =
            DownloadContext::new(dir, post, index).with_display_name(candidate.label.clone());
        let fallback = direct.fetch(&candidate.url, &mut ctx).await;
        if fallback.iter().any(DownloadResult::is_success) {
            return CandidateOutcome::Fetched {
                kind: StrategyKind::Direct,
                results: fallback,
            };
        }

        debug!(url = %candidate.url, "direct fallback failed too");
        let results = if session_results.is_empty() {
            fallback
        } else {
            session_results
        };
        CandidateOutcome::Fetched { kind, results }
    }

    /// Downloads a profile image for `display_name` into `<output>/avatars/`.
    ///
    /// Names with a complete record are skipped. A name is attempted at most
    /// once per run; failed records are retried on later runs.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the manifest cannot be saved.
    #[instrument(skip(self))]
    pub async fn fetch_avatar(
        &mut self,
        display_name: &str,
        url: &str,
    ) -> Result<AvatarOutcome, ManifestError> {
        if self.manifest.has_avatar(display_name) {
            return Ok(AvatarOutcome::AlreadySaved);
        }
        if !self.avatars_attempted.insert(display_name.to_string()) {
            return Ok(AvatarOutcome::AlreadyAttempted);
        }

        let dir = self.config.output_dir.join(AVATAR_DIR_NAME);
        let result = self.avatar_fetcher.fetch_named(url, &dir, display_name).await;
        let update = if result.is_success() {
            AvatarUpdate {
                source_url: url.to_string(),
                filename: result.filename.clone(),
                status: AvatarStatus::Complete,
                error: None,
            }
        } else {
            AvatarUpdate {
                source_url: url.to_string(),
                filename: None,
                status: AvatarStatus::Failed,
                error: result.error.clone(),
            }
        };
        self.manifest.upsert_avatar(display_name, update);
        self.store.save(&mut self.manifest)?;

        Ok(if result.is_success() {
            AvatarOutcome::Saved(result)
        } else {
            AvatarOutcome::Failed(result)
        })
    }
}
