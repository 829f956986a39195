//! Archiver Core Library
//!
//! Resumable media acquisition for archiving community-group posts. Each post
//! (a *unit*) carries candidate URLs; the pipeline picks an acquisition
//! strategy per URL, fetches what it can, keeps the rest as links, and
//! records progress in a per-collection manifest so interrupted runs resume.
//!
//! # Architecture
//!
//! - [`manifest`] - Durable per-collection processing state
//! - [`download`] - HTTP transfer, retry policy, concurrency limiter
//! - [`strategy`] - Acquisition strategies and the strategy registry
//! - [`pipeline`] - Orchestrator driving units through strategies
//! - [`render`] - Output artifacts for processed units
//! - [`config`] - Pipeline settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod manifest;
pub mod pipeline;
pub mod render;
pub mod strategy;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use download::{
    ConcurrencyLimiter, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DownloadError, FailureType,
    HttpClient, RetryPolicy, classify_error,
};
pub use manifest::{Manifest, ManifestError, ManifestStore, PostStatus};
pub use pipeline::{
    ArchiveUnit, AvatarOutcome, CandidateUrl, Orchestrator, PipelineError, UnitOutcome, UnitReport,
};
pub use render::{DocumentRenderer, JsonRecordRenderer};
pub use strategy::{
    AcquisitionStrategy, BrowserSession, DownloadContext, DownloadResult, StrategyRegistry,
    build_default_registry,
};
