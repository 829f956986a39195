//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. The binary loads the optional file, applies CLI
//! overrides, and calls [`PipelineConfig::validate`] before building anything.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::download::content::DEFAULT_SUSPECT_HTML_BYTES;
use crate::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, HttpClient, READ_TIMEOUT_SECS,
    RetryPolicy,
};
use crate::strategy::{DEFAULT_MAX_DEPTH, ScrollSettings, SessionTimeouts};

/// Directory name for per-collection manifests under the output directory.
const MANIFEST_DIR_NAME: &str = ".manifests";

/// Top-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root of the archive.
    pub output_dir: PathBuf,
    /// Manifest directory; defaults to `<output_dir>/.manifests`.
    pub state_dir: Option<PathBuf>,
    /// Simultaneous direct fetches within one unit.
    pub concurrency: usize,
    /// Retry settings for direct fetches.
    pub retry: RetrySettings,
    /// Network and session timeouts.
    pub timeouts: TimeoutSettings,
    /// Folder-listing scroll settings.
    pub scroll: ScrollConfig,
    /// Nesting limit for folder enumeration.
    pub max_folder_depth: usize,
    /// HTML bodies smaller than this are inspected before being kept.
    pub html_suspect_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./archive"),
            state_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            scroll: ScrollConfig::default(),
            max_folder_depth: DEFAULT_MAX_DEPTH,
            html_suspect_bytes: DEFAULT_SUSPECT_HTML_BYTES,
        }
    }
}

/// Retry knobs, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Delay cap.
    pub max_delay_ms: u64,
    /// Multiplier per retry.
    pub backoff_factor: f64,
    /// Random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_ms: 0,
        }
    }
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    /// HTTP connect.
    pub connect_secs: u64,
    /// Whole HTTP request, including body.
    pub read_secs: u64,
    /// Browser navigation.
    pub navigation_secs: u64,
    /// Waiting for a confirmation control.
    pub confirm_secs: u64,
    /// Waiting for a native browser download.
    pub download_capture_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_secs: CONNECT_TIMEOUT_SECS,
            read_secs: READ_TIMEOUT_SECS,
            navigation_secs: 60,
            confirm_secs: 15,
            download_capture_secs: 300,
        }
    }
}

/// Scroll-loop knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrollConfig {
    /// Consecutive empty rounds before the listing counts as complete.
    pub idle_rounds: u32,
    /// Hard ceiling on rounds.
    pub max_rounds: u32,
    /// Pause after each scroll step.
    pub step_delay_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        let settings = ScrollSettings::default();
        Self {
            idle_rounds: settings.idle_rounds,
            max_rounds: settings.max_rounds,
            step_delay_ms: u64::try_from(settings.step_delay.as_millis()).unwrap_or(800),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Reads `path` when given, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`PipelineConfig::load`] errors.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field and its range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.concurrency) {
            bail!(
                "Invalid config value for `concurrency`: {}. Expected range: 1..=100",
                self.concurrency
            );
        }
        if self.retry.max_attempts < 1 || self.retry.max_attempts > 20 {
            bail!(
                "Invalid config value for `retry.max_attempts`: {}. Expected range: 1..=20",
                self.retry.max_attempts
            );
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0) {
            bail!(
                "Invalid config value for `retry.backoff_factor`: {}. Expected a finite value >= 1.0",
                self.retry.backoff_factor
            );
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            bail!(
                "Invalid config value for `retry.max_delay_ms`: {}. Must be >= `retry.initial_delay_ms` ({})",
                self.retry.max_delay_ms,
                self.retry.initial_delay_ms
            );
        }
        validate_timeout_secs("timeouts.connect_secs", self.timeouts.connect_secs)?;
        validate_timeout_secs("timeouts.read_secs", self.timeouts.read_secs)?;
        validate_timeout_secs("timeouts.navigation_secs", self.timeouts.navigation_secs)?;
        validate_timeout_secs("timeouts.confirm_secs", self.timeouts.confirm_secs)?;
        validate_timeout_secs(
            "timeouts.download_capture_secs",
            self.timeouts.download_capture_secs,
        )?;
        if self.scroll.idle_rounds < 1 {
            bail!("Invalid config value for `scroll.idle_rounds`: 0. Expected at least 1");
        }
        if self.scroll.max_rounds < self.scroll.idle_rounds {
            bail!(
                "Invalid config value for `scroll.max_rounds`: {}. Must be >= `scroll.idle_rounds` ({})",
                self.scroll.max_rounds,
                self.scroll.idle_rounds
            );
        }
        if self.max_folder_depth > 10 {
            bail!(
                "Invalid config value for `max_folder_depth`: {}. Expected range: 0..=10",
                self.max_folder_depth
            );
        }
        Ok(())
    }

    /// Manifest directory, defaulting under the output directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(MANIFEST_DIR_NAME))
    }

    /// Retry policy for direct fetches.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.backoff_factor,
        )
        .with_jitter(Duration::from_millis(self.retry.jitter_ms))
    }

    /// Timeouts for session strategies.
    #[must_use]
    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            navigation: Duration::from_secs(self.timeouts.navigation_secs),
            confirm: Duration::from_secs(self.timeouts.confirm_secs),
            download_capture: Duration::from_secs(self.timeouts.download_capture_secs),
            fetch: Duration::from_secs(self.timeouts.read_secs),
        }
    }

    /// Scroll-loop settings for folder enumeration.
    #[must_use]
    pub fn scroll_settings(&self) -> ScrollSettings {
        ScrollSettings {
            idle_rounds: self.scroll.idle_rounds,
            max_rounds: self.scroll.max_rounds,
            step_delay: Duration::from_millis(self.scroll.step_delay_ms),
        }
    }

    /// HTTP client honoring the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot initialize.
    pub fn http_client(&self) -> Result<HttpClient, reqwest::Error> {
        HttpClient::with_timeouts(
            Duration::from_secs(self.timeouts.connect_secs),
            Duration::from_secs(self.timeouts.read_secs),
        )
    }
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<()> {
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.scroll.idle_rounds, 25);
        assert_eq!(config.html_suspect_bytes, 51_200);
        config.validate().unwrap();
    }

    #[test]
    fn test_state_dir_defaults_under_output() {
        let config = PipelineConfig {
            output_dir: PathBuf::from("/srv/archive"),
            ..PipelineConfig::default()
        };
        assert_eq!(config.state_dir(), PathBuf::from("/srv/archive/.manifests"));
    }

    #[test]
    fn test_partial_nested_override() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"retry": {"max_attempts": 5}, "concurrency": 8}"#).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<PipelineConfig>(r#"{"concurency": 3}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = PipelineConfig {
            concurrency: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("`concurrency`"), "got: {err}");

        config.concurrency = 5;
        config.timeouts.confirm_secs = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeouts.confirm_secs"), "got: {err}");

        config.timeouts.confirm_secs = 15;
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archiver.json");
        std::fs::write(&path, r#"{"output_dir": "/data/out", "max_folder_depth": 1}"#).unwrap();
        let config = PipelineConfig::load_optional(Some(&path)).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/data/out"));
        assert_eq!(config.max_folder_depth, 1);
        assert!(PipelineConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
