//! Fixed-size splitting of long replies for length-limited transports.

/// Split `text` into consecutive pieces of `max_chars` characters; the last
/// piece holds the remainder. Joining the pieces gives back `text`.
///
/// Splits on character boundaries only, never inside a code point, and makes
/// no attempt to respect words or sentences.
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == max_chars {
            segments.push(text[start..i].to_string());
            start = i;
            count = 0;
        }
        count += 1;
    }
    segments.push(text[start..].to_string());
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_segment() {
        assert_eq!(chunk("hello", 2000), vec!["hello"]);
        assert_eq!(chunk("", 2000), vec![""]);
    }

    #[test]
    fn test_exact_size_is_single_segment() {
        let text = "a".repeat(2000);
        assert_eq!(chunk(&text, 2000), vec![text]);
    }

    #[test]
    fn test_long_text_splits_losslessly() {
        let text: String = (0..4500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let segments = chunk(&text, 2000);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].chars().count(), 2000);
        assert_eq!(segments[1].chars().count(), 2000);
        assert_eq!(segments[2].chars().count(), 500);
        assert_eq!(segments.concat(), text);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "مرحبا".repeat(1000);
        let segments = chunk(&text, 2000);

        assert_eq!(segments.len(), 3);
        assert!(segments[..2].iter().all(|s| s.chars().count() == 2000));
        assert_eq!(segments.concat(), text);
    }

    #[test]
    fn test_multiple_of_size_has_no_empty_tail() {
        let text = "x".repeat(4000);
        let segments = chunk(&text, 2000);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| !s.is_empty()));
    }
}
