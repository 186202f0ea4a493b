//! Destination filename derivation.
//!
//! A task's destination is the last path segment of its URL, percent-decoded
//! and made safe for common filesystems.

use std::path::{Component, Path};

use url::Url;

/// Name used when a URL has no usable last segment.
const FALLBACK_FILENAME: &str = "download.bin";

/// Sanitizes a filename by replacing invalid characters.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Filename for `url`: its decoded last path segment, or `download.bin`.
///
/// Query strings never contribute; a presigned or tokenized URL still maps
/// to the object name.
pub(crate) fn filename_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty());
    let Some(last) = last else {
        return FALLBACK_FILENAME.to_string();
    };

    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let sanitized = sanitize_filename(&decoded);
    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}
