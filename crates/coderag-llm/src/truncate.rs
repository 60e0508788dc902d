//! Deterministic input truncation.

/// Default character budget, conservative for an 8191-token embedding model.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 24_000;

/// Keep at most `max_chars` characters of `text`, dropping the tail.
///
/// The cut always lands on a char boundary, so repeated calls on the same
/// input yield the same prefix.
#[must_use]
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
