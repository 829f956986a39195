//! Bounded-concurrency batch runner.
//!
//! [`ConcurrencyLimiter::run_batch`] drives one future per item on the current
//! task, gating each behind a semaphore permit so at most `concurrency`
//! operations are in flight. Results come back in input order regardless of
//! completion order.
//!
//! Only stateless work (Direct-Fetch) goes through here. Strategies that drive
//! a shared browser session are serialized by the orchestrator instead.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Error type for limiter construction.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Semaphore-gated, order-preserving batch runner.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Creates a limiter allowing `concurrency` simultaneous operations.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConcurrency`] outside 1..=100.
    pub fn new(concurrency: usize) -> Result<Self, LimiterError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(LimiterError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Highest number of simultaneously running workers observed so far.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Runs `worker` over every item, at most `concurrency` at a time.
    ///
    /// The output vector is index-aligned with `items`. Worker failures are
    /// values in `R`; nothing here aborts the batch.
    #[instrument(skip_all, fields(items = items.len(), concurrency = self.concurrency))]
    pub async fn run_batch<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let in_flight = AtomicUsize::new(0);
        let worker = &worker;
        let in_flight = &in_flight;

        let tasks = items.into_iter().map(|item| async move {
            // The semaphore is owned by self and never closed, so acquire only
            // fails if that invariant breaks; run unthrottled rather than drop work.
            let _permit = self.semaphore.acquire().await.ok();
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let result = worker(item).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        });

        let results = join_all(tasks).await;
        debug!(
            completed = results.len(),
            peak = self.peak_in_flight(),
            "batch complete"
        );
        results
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            concurrency: DEFAULT_CONCURRENCY,
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}
