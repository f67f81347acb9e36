//! Sliding-window text chunker.
//!
//! Splits document text into consecutive windows of `chunk_size` characters,
//! each overlapping the previous by `overlap` characters. Windows advance by
//! `chunk_size - overlap`, so the same tail of one chunk reappears as the
//! head of the next — the overlap keeps sentences that straddle a boundary
//! retrievable from both sides.
//!
//! All offsets are in Unicode scalar values, never bytes, so multi-byte
//! text cannot be split mid-character.

use crate::error::ConfigError;

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Text shorter than (or equal to) `chunk_size` yields a single chunk
/// containing the whole text. The output is eager and order-preserving:
/// embeddings are batched downstream, so every chunk is needed up front.
///
/// # Errors
///
/// `ConfigError` if `chunk_size` is zero or `overlap >= chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::ZeroChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ConfigError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(chars.len() / step + 1);
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 100, 10).unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_single_chunk() {
        let chunks = chunk_text("", 100, 10).unwrap();
        assert_eq!(chunks, vec![String::new()]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let text = "a".repeat(10);
        let chunks = chunk_text(&text, 10, 3).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_windows_overlap() {
        // chunk_size=10, overlap=4 => step=6
        let text: String = ('a'..='z').collect();
        let chunks = chunk_text(&text, 10, 4).unwrap();

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            let tail: String = prev[prev.len() - 4..].iter().collect();
            let head: String = next[..4.min(next.len())].iter().collect();
            assert!(
                tail.starts_with(&head) || head == tail,
                "overlap mismatch: tail={:?} head={:?}",
                tail,
                head
            );
        }
    }

    #[test]
    fn test_concatenation_reconstructs_text() {
        let text = "The quick brown fox jumps over the lazy dog repeatedly.";
        let chunk_size = 12;
        let overlap = 5;
        let chunks = chunk_text(text, chunk_size, overlap).unwrap();

        // First chunk whole, then each subsequent chunk minus its overlap head.
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            let chars: Vec<char> = c.chars().collect();
            let fresh: String = chars[overlap.min(chars.len())..].iter().collect();
            rebuilt.push_str(&fresh);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "héllo wörld ünïcödé çhäräctérs évérywhere in this téxt";
        let chunks = chunk_text(text, 7, 2).unwrap();
        // Every chunk must be valid UTF-8 of at most 7 chars (guaranteed by
        // construction, but verify the char counts).
        for c in &chunks {
            assert!(c.chars().count() <= 7);
        }
        // Reconstruction check as above.
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            let chars: Vec<char> = c.chars().collect();
            rebuilt.extend(chars[2.min(chars.len())..].iter());
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_zero_overlap() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 3, 0).unwrap();
        assert_eq!(chunks, vec!["abc", "def", "ghi", "j"]);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        assert_eq!(
            chunk_text("hello", 5, 5),
            Err(ConfigError::OverlapTooLarge {
                chunk_size: 5,
                overlap: 5
            })
        );
        assert!(chunk_text("hello", 5, 9).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert_eq!(chunk_text("hello", 0, 0), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa.";
        let a = chunk_text(text, 15, 4).unwrap();
        let b = chunk_text(text, 15, 4).unwrap();
        assert_eq!(a, b);
    }
}
