//! Filename extraction from URL path.

use percent_encoding::percent_decode_str;

/// Extracts the last path segment from a URL for use as a filename hint.
/// Percent-escapes are decoded (lossily for invalid UTF-8).
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let segment = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    if segment.is_empty() || segment == "." || segment == ".." {
        return None;
    }
    Some(segment)
}
