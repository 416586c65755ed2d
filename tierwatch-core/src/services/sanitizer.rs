//! Text sanitization and dedup keys
//!
//! Corpus rows and inference inputs go through the same pipeline so that the
//! model sees at serving time exactly what it was trained on.

use unicode_normalization::UnicodeNormalization;

/// Canonicalize a message for storage and vectorization
///
/// NFKC normalization, whitespace runs collapsed to one space, control
/// characters dropped, and only letters, digits and `. ! ?` kept.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.nfkc() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }
        if !(c.is_alphanumeric() || matches!(c, '.' | '!' | '?')) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

/// Dedup key: sanitized text, case-folded
pub fn dedup_key(raw: &str) -> String {
    sanitize_text(raw).to_lowercase()
}
