//! Direct-Fetch: stream a URL over plain HTTP.
//!
//! The fallback strategy. It claims every http(s) URL except the shapes that
//! are known to be pages, apps, or feeds rather than files (see
//! [`non_fetchable_reason`]). The body lands in a temp file first; the final
//! extension comes from the declared content type, and small HTML bodies go
//! through [`classify_html`] before being kept.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::content::{
    DEFAULT_SUSPECT_HTML_BYTES, FALLBACK_EXTENSION, is_html_content_type,
};
use crate::download::filename::{
    build_filename, extension_from_url, named_file, stem_from_url,
};
use crate::download::{
    DownloadError, FetchedFile, HtmlVerdict, HttpClient, RetryPolicy, classify_error,
    classify_html, extension_from_content_type,
};

use super::{
    AcquisitionStrategy, DIRECT_PRIORITY, DownloadContext, DownloadResult, Placement,
    StrategyKind, move_into_place,
};

/// Why a URL is not worth fetching as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFetchableReason {
    /// `mailto:` link.
    MailTo,
    /// Scheme other than http/https (`tel:`, `javascript:`, ...).
    NonHttpScheme,
    /// Forms, meetings, app-store listings.
    InteractiveApp,
    /// Video streaming page.
    VideoStreaming,
    /// Map view.
    Map,
    /// Shop or product page.
    Commerce,
    /// Social-network post or profile.
    SocialPost,
    /// Bare site root with no path.
    DomainRoot,
    /// No registered strategy claimed the URL.
    NoStrategy,
}

impl NonFetchableReason {
    /// Returns the serialized string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MailTo => "mail_to",
            Self::NonHttpScheme => "non_http_scheme",
            Self::InteractiveApp => "interactive_app",
            Self::VideoStreaming => "video_streaming",
            Self::Map => "map",
            Self::Commerce => "commerce",
            Self::SocialPost => "social_post",
            Self::DomainRoot => "domain_root",
            Self::NoStrategy => "no_strategy",
        }
    }
}

impl fmt::Display for NonFetchableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitch.tv",
    "tiktok.com",
    "dailymotion.com",
];

const SOCIAL_HOSTS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "fb.watch",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "threads.net",
    "reddit.com",
];

const APP_HOSTS: &[&str] = &[
    "forms.gle",
    "calendar.google.com",
    "meet.google.com",
    "zoom.us",
    "apps.apple.com",
    "play.google.com",
    "eventbrite.com",
    "meetup.com",
];

const MAP_HOSTS: &[&str] = &["maps.google.com", "maps.app.goo.gl", "openstreetmap.org"];

/// Second-level labels of shop domains, matched across TLDs.
const COMMERCE_LABELS: &[&str] = &["amazon", "amzn", "ebay", "etsy", "aliexpress", "walmart"];

/// Classifies URL shapes that are pages or apps rather than files.
///
/// Returns `None` for anything that may be fetchable. Unparseable URLs are
/// also `None`; the fetch itself reports them as invalid.
#[must_use]
pub fn non_fetchable_reason(url: &str) -> Option<NonFetchableReason> {
    let trimmed = url.trim();
    if trimmed
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
    {
        return Some(NonFetchableReason::MailTo);
    }

    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Some(NonFetchableReason::NonHttpScheme);
    }

    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path().to_ascii_lowercase();

    if host_matches(&host, MAP_HOSTS)
        || (host_matches(&host, &["google.com"]) && path.starts_with("/maps"))
        || (host == "goo.gl" && path.starts_with("/maps"))
    {
        return Some(NonFetchableReason::Map);
    }
    if host_matches(&host, VIDEO_HOSTS) {
        return Some(NonFetchableReason::VideoStreaming);
    }
    if host_matches(&host, SOCIAL_HOSTS) {
        return Some(NonFetchableReason::SocialPost);
    }
    if host_matches(&host, APP_HOSTS)
        || (host == "docs.google.com" && path.starts_with("/forms"))
    {
        return Some(NonFetchableReason::InteractiveApp);
    }
    if host
        .split('.')
        .rev()
        .skip(1)
        .any(|label| COMMERCE_LABELS.contains(&label))
    {
        return Some(NonFetchableReason::Commerce);
    }
    if (path.is_empty() || path == "/") && parsed.query().is_none() {
        return Some(NonFetchableReason::DomainRoot);
    }
    None
}

fn host_matches(host: &str, domains: &[&str]) -> bool {
    let host = host.strip_prefix("www.").unwrap_or(host);
    domains.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// How a kept file is named.
enum Naming<'a> {
    /// `{index:03}_{stem}.{ext}`, stem from label or discovery. Reruns
    /// replace the file at that name.
    Indexed { index: usize, label: Option<&'a str> },
    /// `{stem}.{ext}` with a fixed stem, suffixed when the name is taken.
    Named(&'a str),
}

/// Stateless HTTP fetch with retry and content inspection.
#[derive(Debug, Clone)]
pub struct DirectFetchStrategy {
    client: HttpClient,
    retry: RetryPolicy,
    html_suspect_bytes: u64,
}

impl Default for DirectFetchStrategy {
    fn default() -> Self {
        Self::new(HttpClient::new(), RetryPolicy::default())
    }
}

impl DirectFetchStrategy {
    /// Creates the strategy with the default HTML suspect threshold.
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            html_suspect_bytes: DEFAULT_SUSPECT_HTML_BYTES,
        }
    }

    /// Overrides the size under which HTML bodies are inspected.
    #[must_use]
    pub fn with_html_suspect_bytes(mut self, bytes: u64) -> Self {
        self.html_suspect_bytes = bytes;
        self
    }

    /// Fetches `url` into `dir` as `{stem}.{ext}`, without an index prefix.
    ///
    /// Used for avatars, where the name is the person's display name.
    #[instrument(skip(self, dir), fields(strategy = "direct"))]
    pub async fn fetch_named(&self, url: &str, dir: &Path, stem: &str) -> DownloadResult {
        self.fetch_with(url, dir, &Naming::Named(stem)).await
    }

    async fn fetch_with(&self, url: &str, dir: &Path, naming: &Naming<'_>) -> DownloadResult {
        let outcome = self
            .retry
            .run_if(
                |attempt| {
                    debug!(attempt, url, "direct fetch attempt");
                    self.fetch_once(url, dir, naming)
                },
                |error| classify_error(error).is_retryable(),
            )
            .await;

        match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!(url, error = %error, "direct fetch failed");
                DownloadResult::failed(url, error.to_string())
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        dir: &Path,
        naming: &Naming<'_>,
    ) -> Result<DownloadResult, DownloadError> {
        let fetched = self.client.fetch_to_temp(url, dir).await?;
        let extension = resolve_extension(&fetched, url);

        if extension == "html"
            && fetched.bytes < self.html_suspect_bytes
            && let HtmlVerdict::Unwanted(reason) = self.inspect_html(&fetched).await
        {
            info!(url, reason = %reason, bytes = fetched.bytes, "discarding unwanted HTML");
            let _ = tokio::fs::remove_file(&fetched.temp_path).await;
            return Err(DownloadError::unwanted(url, reason));
        }

        let (filename, source_name, placement) = match naming {
            Naming::Indexed { index, label } => {
                let stem = label
                    .map(str::to_string)
                    .or_else(|| fetched.suggested_name.clone())
                    .or_else(|| stem_from_url(&fetched.final_url))
                    .or_else(|| stem_from_url(url))
                    .unwrap_or_default();
                let source_name = label
                    .map(str::to_string)
                    .or_else(|| fetched.suggested_name.clone());
                (
                    build_filename(*index, &stem, &extension),
                    source_name,
                    Placement::Replace,
                )
            }
            Naming::Named(stem) => (
                named_file(stem, &extension),
                Some((*stem).to_string()),
                Placement::Unique,
            ),
        };

        let final_path = move_into_place(&fetched.temp_path, dir, &filename, placement).await?;
        debug!(path = %final_path.display(), bytes = fetched.bytes, "direct fetch stored");

        Ok(DownloadResult::success(
            url,
            final_path,
            fetched.bytes,
            fetched.content_type.clone(),
            extension,
        )
        .with_source_name(source_name))
    }

    async fn inspect_html(&self, fetched: &FetchedFile) -> HtmlVerdict {
        match tokio::fs::read(&fetched.temp_path).await {
            Ok(bytes) => classify_html(
                &String::from_utf8_lossy(&bytes),
                fetched.bytes,
                self.html_suspect_bytes,
            ),
            Err(error) => {
                debug!(error = %error, "could not read HTML body for inspection, keeping it");
                HtmlVerdict::Keep
            }
        }
    }
}

/// A known content type wins; otherwise the URL's own extension, then `bin`.
fn resolve_extension(fetched: &FetchedFile, url: &str) -> String {
    match fetched.content_type.as_deref() {
        Some(content_type) if is_html_content_type(content_type) => "html".to_string(),
        Some(content_type) if extension_from_content_type(content_type) != FALLBACK_EXTENSION => {
            extension_from_content_type(content_type).to_string()
        }
        _ => extension_from_url(&fetched.final_url)
            .or_else(|| extension_from_url(url))
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string()),
    }
}

#[async_trait]
impl AcquisitionStrategy for DirectFetchStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn priority(&self) -> i32 {
        DIRECT_PRIORITY
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url.trim()).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
            && non_fetchable_reason(url).is_none()
    }

    #[instrument(skip(self, ctx), fields(strategy = "direct", post = %ctx.post.id, index = ctx.index))]
    async fn fetch(&self, url: &str, ctx: &mut DownloadContext<'_>) -> Vec<DownloadResult> {
        let naming = Naming::Indexed {
            index: ctx.index,
            label: ctx.display_name.as_deref(),
        };
        vec![self.fetch_with(url, &ctx.output_dir, &naming).await]
    }
}
