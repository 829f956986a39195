//! Transfer primitives shared by the acquisition strategies.
//!
//! # Features
//!
//! - Streaming downloads into temporary files (memory-efficient for large media)
//! - Content-type → extension table with a `bin` fallback
//! - HTML classifier for error/marketing pages served with HTTP 200
//! - Exponential-backoff retry wrapper ([`RetryPolicy`])
//! - Order-preserving bounded-concurrency batches ([`ConcurrencyLimiter`])
//!
//! # Example
//!
//! ```no_run
//! use archiver_core::download::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let fetched = client
//!     .fetch_to_temp("https://example.com/flyer.pdf", Path::new("./archive"))
//!     .await?;
//! println!("{} bytes, type {:?}", fetched.bytes, fetched.content_type);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
pub mod content;
mod error;
pub mod filename;
mod limiter;
mod retry;

pub use client::{FetchedFile, HttpClient};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use content::{HtmlVerdict, classify_html, extension_from_content_type};
pub use error::DownloadError;
pub use limiter::{ConcurrencyLimiter, DEFAULT_CONCURRENCY, LimiterError};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryPolicy, classify_error};

// Note: no module-local Result aliases; signatures spell out
// `Result<T, DownloadError>`.
