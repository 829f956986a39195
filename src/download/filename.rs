//! Filename derivation, sanitization, and path resolution for fetched artifacts.
//!
//! Generated names are deterministic for a given unit: `{index:03}_{stem}.{ext}`,
//! where the stem comes from a caller label, a server-suggested name, or the
//! URL path, and the extension always comes from the resolved content type.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use url::Url;

use super::content::is_known_extension;

/// Longest stem kept in generated filenames (characters).
const MAX_STEM_CHARS: usize = 80;

/// Builds the final filename for the `index`-th artifact of a unit.
///
/// Any extension already present on `stem` is stripped before `extension`
/// is appended, so `report.pdf` + `pdf` yields `007_report.pdf`, never
/// `007_report.pdf.pdf`.
#[must_use]
pub fn build_filename(index: usize, stem: &str, extension: &str) -> String {
    let stem = sanitize_filename_component(strip_extension(stem));
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = if stem.is_empty() { "file".to_string() } else { stem };
    format!("{index:03}_{stem}.{extension}")
}

/// Joins a discovered name's stem with a resolved extension, without an index prefix.
#[must_use]
pub fn named_file(stem: &str, extension: &str) -> String {
    let stem = sanitize_filename_component(strip_extension(stem));
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = if stem.is_empty() { "file".to_string() } else { stem };
    format!("{stem}.{extension}")
}

/// Removes a trailing `.ext` from `name` when `ext` is a known file type.
///
/// Other dotted suffixes (`v1.final`, `report.2024`) are part of the stem.
#[must_use]
pub fn strip_extension(name: &str) -> &str {
    let trimmed = name.trim();
    match trimmed.rfind('.') {
        Some(pos) if pos > 0 && is_known_extension(&trimmed[pos + 1..]) => &trimmed[..pos],
        _ => trimmed,
    }
}

/// Returns the lowercase extension of `name` (without the dot), if it has one.
#[must_use]
pub fn extension_of(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let stripped = strip_extension(trimmed);
    if stripped.len() == trimmed.len() {
        return None;
    }
    Some(trimmed[stripped.len() + 1..].to_ascii_lowercase())
}

/// Extension of the URL's last path segment, lowercased, without the dot.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    extension_of(last_segment)
}

/// Best human-readable stem for a URL: its decoded last path segment.
#[must_use]
pub fn stem_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let stem = strip_extension(&decoded).to_string();
    (!stem.is_empty()).then_some(stem)
}

/// Collapses anything outside `[alnum - _ .]` to single underscores.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.').to_string();
    if is_safe_filename_segment(&trimmed) {
        trimmed
    } else {
        trimmed.replace('.', "_")
    }
}

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles `filename="a.pdf"`, `filename=a.pdf`, and RFC 5987 `filename*=UTF-8''a.pdf`.
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Resolves a unique file path, adding `_2`, `_3`, ... if the name is taken on disk.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    first_free(dir, filename, |candidate| !candidate.exists())
}

/// Claims `filename` in `dir` for this run, adding `_2`, `_3`, ... only when
/// the name was already claimed in `claimed`.
///
/// Files an earlier run left on disk do not count: the deterministic name is
/// reused and the old file gets replaced.
pub fn claim_path(dir: &Path, filename: &str, claimed: &mut HashSet<PathBuf>) -> PathBuf {
    let path = first_free(dir, filename, |candidate| !claimed.contains(candidate));
    claimed.insert(path.clone());
    path
}

fn first_free(dir: &Path, filename: &str, is_free: impl Fn(&Path) -> bool) -> PathBuf {
    let base_path = dir.join(filename);
    if is_free(&base_path) {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };

    for i in 2..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if is_free(&candidate) {
            return candidate;
        }
    }

    let timestamp = chrono::Utc::now().timestamp();
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Directory-safe slug of a unit title, capped at `max_chars`.
#[must_use]
pub fn slugify(title: &str, max_chars: usize) -> String {
    let cleaned = sanitize_filename_component(&title.to_lowercase()).replace('.', "_");
    let slug: String = cleaned.chars().take(max_chars).collect();
    slug.trim_matches('_').to_string()
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
