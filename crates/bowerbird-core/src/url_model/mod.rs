//! Local filename derivation for downloads.
//!
//! Job producers usually decide the destination themselves; these helpers
//! cover the common case of saving a URL under its own last path segment.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default filename when the URL path yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for saving `url`.
///
/// Uses the last path segment, sanitized with [`sanitize_filename`]. Falls
/// back to `download.bin` for empty, root or reserved (`.`/`..`) names.
///
/// # Examples
///
/// - `derive_filename("https://example.com/archive.zip", false)` → `"archive.zip"`
/// - `derive_filename("https://example.com/", false)` → `"download.bin"`
pub fn derive_filename(url: &str, windows_safe: bool) -> String {
    let Some(raw) = filename_from_url_path(url) else {
        return DEFAULT_FILENAME.to_string();
    };

    let sanitized = sanitize_filename(&raw, windows_safe);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
