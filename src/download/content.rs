//! Content-type mapping and HTML content classification.
//!
//! Servers routinely answer a dead link with a styled error or marketing page
//! and HTTP 200, so a successful status says little about an HTML body.
//! [`classify_html`] inspects small HTML responses and flags the ones that are
//! not worth keeping.

use std::sync::LazyLock;

use regex::Regex;

/// Extension used when the content type is unknown.
pub const FALLBACK_EXTENSION: &str = "bin";

/// HTML responses at or above this size are kept without inspection.
pub const DEFAULT_SUSPECT_HTML_BYTES: u64 = 50 * 1024;

/// Phrases that identify an error page.
const ERROR_PHRASES: &[&str] = &[
    "404 not found",
    "page not found",
    "this page isn't available",
    "this page isn&#039;t available",
    "the page you requested could not be found",
    "content isn't available",
    "access denied",
    "403 forbidden",
    "file does not exist",
    "sorry, the file you have requested does not exist",
    "this link has expired",
    "something went wrong",
    "internal server error",
    "service unavailable",
];

/// Phrases that identify app-store or marketing interstitials.
const MARKETING_PHRASES: &[&str] = &[
    "download on the app store",
    "get it on google play",
    "open in app",
    "install the app",
    "download the app",
    "continue in browser",
    "sign up to see",
    "log in to continue",
];

/// Paragraph-like blocks required before a page counts as article content.
const MIN_PARAGRAPH_BLOCKS: usize = 3;

#[allow(clippy::expect_used)]
static PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<p[\s>]").expect("paragraph regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:article|main)[\s>]").expect("article regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static NAV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<nav[\s>]|role\s*=\s*["']navigation["']"#).expect("nav regex is valid") // Static pattern, safe to panic
});

/// Maps a Content-Type header value to a file extension (no leading dot).
///
/// Parameters such as `; charset=utf-8` are ignored. Unknown types map to
/// [`FALLBACK_EXTENSION`], never to an empty string.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/css" => "css",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/rtf" => "rtf",
        "application/epub+zip" => "epub",
        "application/zip" | "application/x-zip-compressed" => "zip",
        "application/gzip" => "gz",
        "application/x-7z-compressed" => "7z",
        "application/vnd.rar" | "application/x-rar-compressed" => "rar",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/heic" => "heic",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-msvideo" => "avi",
        "audio/mpeg" => "mp3",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        _ => FALLBACK_EXTENSION,
    }
}

/// File extensions recognized when splitting a discovered name into stem and
/// extension: every target of the content-type table plus common aliases.
const KNOWN_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "txt", "md", "csv", "tsv", "css", "json", "xml", "pdf", "doc",
    "docx", "odt", "xls", "xlsx", "ods", "ppt", "pptx", "odp", "rtf", "epub", "pages", "key",
    "numbers", "ics", "vcf", "zip", "gz", "tgz", "tar", "bz2", "xz", "7z", "rar", "jpg", "jpeg",
    "png", "gif", "webp", "svg", "heic", "heif", "avif", "bmp", "tif", "tiff", "ico", "psd",
    "mp4", "m4v", "mov", "webm", "avi", "mkv", "wmv", "flv", "3gp", "mpg", "mpeg", "mp3",
    "m4a", "wav", "ogg", "oga", "flac", "aac", "opus", "bin",
];

/// Returns true when `extension` (no dot, any case) names a known file type.
#[must_use]
pub fn is_known_extension(extension: &str) -> bool {
    KNOWN_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(extension))
}

/// Returns true when the content type maps to HTML.
#[must_use]
pub fn is_html_content_type(content_type: &str) -> bool {
    extension_from_content_type(content_type) == "html"
}

/// Returns true for extensions of video containers.
#[must_use]
pub fn is_video_extension(extension: &str) -> bool {
    matches!(extension, "mp4" | "mov" | "webm" | "avi" | "mkv" | "m4v")
}

/// Verdict from [`classify_html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlVerdict {
    /// Keep the page.
    Keep,
    /// Discard the page; the string names the matching rule.
    Unwanted(String),
}

impl HtmlVerdict {
    /// Returns true if the page should be discarded.
    #[must_use]
    pub fn is_unwanted(&self) -> bool {
        matches!(self, Self::Unwanted(_))
    }
}

/// Decides whether an HTML body of `size` bytes is real content.
///
/// Bodies at or over `suspect_threshold` bytes are kept. Smaller bodies are
/// unwanted if they contain a known error or marketing phrase, or look like a
/// navigation shell: fewer than three paragraph blocks, no article blocks,
/// at least one navigation block.
#[must_use]
pub fn classify_html(body: &str, size: u64, suspect_threshold: u64) -> HtmlVerdict {
    if size >= suspect_threshold {
        return HtmlVerdict::Keep;
    }

    let lowered = body.to_lowercase();
    if let Some(phrase) = ERROR_PHRASES.iter().find(|p| lowered.contains(*p)) {
        return HtmlVerdict::Unwanted(format!("error page phrase \"{phrase}\""));
    }
    if let Some(phrase) = MARKETING_PHRASES.iter().find(|p| lowered.contains(*p)) {
        return HtmlVerdict::Unwanted(format!("app-store/marketing phrase \"{phrase}\""));
    }

    let paragraphs = PARAGRAPH_RE.find_iter(body).count();
    let articles = ARTICLE_RE.find_iter(body).count();
    let navs = NAV_RE.find_iter(body).count();
    if paragraphs < MIN_PARAGRAPH_BLOCKS && articles == 0 && navs > 0 {
        return HtmlVerdict::Unwanted(format!(
            "navigation-only page ({paragraphs} paragraphs, {navs} nav blocks)"
        ));
    }

    HtmlVerdict::Keep
}
