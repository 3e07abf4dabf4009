//! Character-bounded text windows for generative rewrites.

use std::ops::Range;

/// Byte range covering `radius` characters on both sides of `anchor`.
pub fn around(text: &str, anchor: Range<usize>, radius: usize) -> Range<usize> {
    back(text, anchor.start, radius)..forward(text, anchor.end, radius)
}

/// Byte range covering `radius` characters on both sides of the character
/// midpoint, or `None` for empty text.
pub fn around_midpoint(text: &str, radius: usize) -> Option<Range<usize>> {
    if text.is_empty() {
        return None;
    }
    let mid_char = text.chars().count() / 2;
    let mid = forward(text, 0, mid_char);
    Some(around(text, mid..mid, radius))
}

fn back(text: &str, from: usize, n: usize) -> usize {
    text[..from]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(from)
}

fn forward(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}
