//! Character-offset helpers shared by the extractor, diff and validator.

use std::sync::LazyLock;

use regex::Regex;

use crate::Span;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

/// Number of characters (not bytes) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Copy out the characters covered by `span`, clamped to the text.
pub fn slice_chars(text: &str, span: Span) -> String {
    text.chars()
        .skip(span.start)
        .take(span.len())
        .collect()
}

/// Trim and collapse every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Whitespace-collapsed characters paired with the offset each one came from.
///
/// Used by fuzzy matching to translate a hit in normalized text back into
/// offsets of the original text. A collapsed run maps to its first character.
pub(crate) fn normalize_with_offsets(chars: &[char]) -> (Vec<char>, Vec<usize>) {
    let mut normalized = Vec::with_capacity(chars.len());
    let mut origins = Vec::with_capacity(chars.len());
    let mut in_space = false;

    for (index, &ch) in chars.iter().enumerate() {
        if ch.is_whitespace() {
            if !in_space && !normalized.is_empty() {
                normalized.push(' ');
                origins.push(index);
            }
            in_space = true;
        } else {
            normalized.push(ch);
            origins.push(index);
            in_space = false;
        }
    }

    if normalized.last() == Some(&' ') {
        normalized.pop();
        origins.pop();
    }

    (normalized, origins)
}
