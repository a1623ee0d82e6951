//! Filename sanitization by fullwidth substitution.
//!
//! Characters a filesystem would reject are swapped for their fullwidth
//! lookalikes instead of being dropped, so names stay readable and distinct.

/// Linux NAME_MAX, in bytes.
const NAME_MAX: usize = 255;

/// Replacements applied on every platform.
const ALWAYS: &[(char, char)] = &[('/', '／')];

/// Extra replacements for names that must also be valid on Windows.
const WINDOWS: &[(char, char)] = &[
    (':', '：'),
    ('*', '＊'),
    ('?', '？'),
    ('"', '“'),
    ('<', '＜'),
    ('>', '＞'),
    ('|', '｜'),
    ('\\', '／'),
];

fn substitute(c: char, windows_safe: bool) -> Option<char> {
    let extra: &[(char, char)] = if windows_safe { WINDOWS } else { &[] };
    ALWAYS
        .iter()
        .chain(extra)
        .find(|(from, _)| *from == c)
        .map(|&(_, to)| to)
}

/// Sanitizes a candidate filename.
///
/// - Replaces `/` (and, when `windows_safe`, `: * ? " < > | \`) with
///   fullwidth equivalents
/// - Replaces NUL and other control characters with `_`
/// - Trims leading/trailing whitespace and dots
/// - Limits length to 255 bytes without splitting a character
pub fn sanitize_filename(name: &str, windows_safe: bool) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if let Some(r) = substitute(c, windows_safe) {
            out.push(r);
        } else if c.is_control() {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
