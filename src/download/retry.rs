//! Retry logic with exponential backoff for transient fetch failures.
//!
//! [`RetryPolicy::run`] retries any failing operation; [`RetryPolicy::run_if`]
//! lets the caller veto retries, which Direct-Fetch uses together with
//! [`classify_error`] to stop early on permanent failures.
//!
//! # Delay Calculation
//!
//! ```text
//! delay_n = min(initial_delay * backoff_factor^n, max_delay) + jitter
//! ```
//!
//! where `n` is the zero-based retry number. No sleep follows the final attempt.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use archiver_core::download::RetryPolicy;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4), 2.0);
//! let result: Result<u32, String> = policy.run(|attempt| async move {
//!     if attempt < 3 { Err(format!("attempt {attempt} failed")) } else { Ok(attempt) }
//! }).await;
//! assert_eq!(result, Ok(3));
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (1 second).
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (30 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, an HTML error page served with 200.
    Permanent,

    /// Authentication or authorization required.
    NeedsAuth,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

impl FailureType {
    /// Returns true when another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `initial_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `backoff_factor`: 2.0
/// - `max_jitter`: none
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay before the first retry.
    initial_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each retry.
    backoff_factor: f64,

    /// Upper bound of random jitter added to each delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1; `backoff_factor` to at least 1.0.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            max_jitter: Duration::ZERO,
        }
    }

    /// Adds up to `max_jitter` of random delay to every backoff sleep.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay before retry number `retry` (zero-based), without jitter.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = initial_ms * self.backoff_factor.powi(retry.min(64) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Runs `operation` until it succeeds or attempts are exhausted.
    ///
    /// Every error is treated as retryable. The closure receives the 1-indexed
    /// attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error observed, unchanged.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(operation, |_| true).await
    }

    /// Like [`run`](Self::run) but stops as soon as `should_retry` rejects an error.
    ///
    /// # Errors
    ///
    /// Returns the last error observed, unchanged.
    #[instrument(level = "debug", skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn run_if<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts {
                        debug!(attempt, error = %error, "max attempts reached");
                        return Err(error);
                    }
                    if !should_retry(&error) {
                        debug!(attempt, error = %error, "error not retryable");
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt - 1) + self.jitter();
                    debug!(
                        attempt,
                        next_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 401/403/407 | NeedsAuth |
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | other HTTP 4xx | Permanent |
/// | Timeout, Network (non-TLS) | Transient |
/// | Network (TLS) | Permanent |
/// | Io, InvalidUrl, UnwantedContent | Permanent |
/// | Session | Transient |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } | DownloadError::Session { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::UnwantedContent { .. } => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 | 403 | 407 => FailureType::NeedsAuth,
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
        )
    }

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!((policy.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(policy.max_jitter.is_zero());
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(
            RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0).max_attempts(),
            1
        );
    }

    #[test]
    fn test_delay_follows_exponential_formula() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(30), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_respects_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default().with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            assert!(policy.jitter() <= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_run_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = fast_policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let result: Result<u32, String> = fast_policy(5)
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(format!("fail {attempt}"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_run_propagates_last_error_unchanged() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = fast_policy(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure on attempt {attempt}")) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "failure on attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_if_stops_on_rejected_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DownloadError> = fast_policy(5)
            .run_if(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(DownloadError::http_status("https://example.com/x", 404)) }
                },
                |error| classify_error(error).is_retryable(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_if_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DownloadError> = fast_policy(4)
            .run_if(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(DownloadError::http_status("https://example.com/x", 503)) }
                },
                |error| classify_error(error).is_retryable(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_classify_http_statuses() {
        let cases = [
            (400, FailureType::Permanent),
            (401, FailureType::NeedsAuth),
            (403, FailureType::NeedsAuth),
            (404, FailureType::Permanent),
            (408, FailureType::Transient),
            (429, FailureType::RateLimited),
            (500, FailureType::Transient),
            (503, FailureType::Transient),
        ];
        for (status, expected) in cases {
            let error = DownloadError::http_status("http://example.com", status);
            assert_eq!(classify_error(&error), expected, "status {status}");
        }
    }

    #[test]
    fn test_classify_non_http_errors() {
        assert_eq!(
            classify_error(&DownloadError::timeout("http://example.com")),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::unwanted("http://example.com", "nav shell")),
            FailureType::Permanent
        );
    }
}
