//! Filename sanitization for archive and attachment names.

/// Characters that are invalid in filenames on at least one platform.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Fallback base name when sanitization leaves nothing usable.
const FALLBACK_NAME: &str = "download";

/// Sanitize a display name for use as an archive/attachment base name.
///
/// Strips control characters and characters illegal in filenames, trims
/// leading/trailing spaces and dots, and falls back to `"download"` when the
/// result would be empty.
pub fn sanitize_base_name(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !c.is_control() && !INVALID_CHARS.contains(c))
        .collect();

    let trimmed = stripped.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
