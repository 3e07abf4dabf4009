//! Naive character-count segmentation.

/// Split `text` into contiguous, non-overlapping segments of at most
/// `chunk_size` characters. Boundaries ignore sentences and chapters but
/// never split a code point. Empty text yields no segments.
pub fn split_chunks(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (i, _) in text.char_indices() {
        if count == chunk_size {
            chunks.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_chunks("hello", 50_000), vec!["hello"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_chunks("", 10).is_empty());
    }

    #[test]
    fn test_chunks_are_bounded_and_contiguous() {
        let text = "abcdefghij";
        let chunks = split_chunks(text, 3);
        assert_eq!(chunks, vec!["abc", "def", "ghi", "j"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        assert_eq!(split_chunks("abcdef", 3), vec!["abc", "def"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "ééééé";
        let chunks = split_chunks(text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2));
    }

    #[test]
    fn test_zero_size_is_treated_as_one() {
        assert_eq!(split_chunks("ab", 0), vec!["a", "b"]);
    }
}
