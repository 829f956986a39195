//! Errors that stop the orchestrator from opening a collection.

use thiserror::Error;

use crate::download::LimiterError;
use crate::manifest::ManifestError;

/// Setup failures. Per-URL fetch failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Manifest could not be loaded or saved.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Concurrency setting out of range.
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },
}
