//! Paragraph-packing text chunker.
//!
//! Splits document text on blank lines (`\n\n`) and greedily packs whole
//! paragraphs into chunks of at most `max_chars` characters. Paragraphs
//! are never split: a paragraph that is longer than `max_chars` on its own
//! becomes a single oversized chunk and is reported through
//! [`ChunkDraft::oversized`].
//!
//! Lengths are counted in `char`s, and the `\n\n` separator between two
//! packed paragraphs counts as 2.
//!
//! # Example
//!
//! ```rust
//! use tenant_rag_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 800);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};

/// Default chunk size in characters.
pub const DEFAULT_MAX_CHARS: usize = 800;

const SEPARATOR: &str = "\n\n";

/// A chunk of text before embedding and access tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 hex of `text`.
    pub hash: String,
    /// Set when a single paragraph exceeded `max_chars` and was kept whole.
    pub oversized: bool,
}

/// Split text into paragraph-aligned chunks.
///
/// Returns an empty vector when the text has no non-blank paragraph.
/// Indices are contiguous from 0.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<ChunkDraft> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for para in text.split(SEPARATOR) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        let would_be = if buf.is_empty() {
            para_chars
        } else {
            buf_chars + SEPARATOR.len() + para_chars
        };

        if would_be > max_chars && !buf.is_empty() {
            push_chunk(&mut chunks, &buf, false);
            buf.clear();
            buf_chars = 0;
        }

        if para_chars > max_chars {
            push_chunk(&mut chunks, trimmed, true);
            continue;
        }

        if !buf.is_empty() {
            buf.push_str(SEPARATOR);
            buf_chars += SEPARATOR.len();
        }
        buf.push_str(trimmed);
        buf_chars += para_chars;
    }

    if !buf.is_empty() {
        push_chunk(&mut chunks, &buf, false);
    }

    chunks
}

/// SHA-256 hex digest of a string.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn push_chunk(chunks: &mut Vec<ChunkDraft>, text: &str, oversized: bool) {
    chunks.push(ChunkDraft {
        chunk_index: chunks.len() as i64,
        text: text.to_string(),
        hash: content_hash(text),
        oversized,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert!(!chunks[0].oversized);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 800).is_empty());
        assert!(chunk_text("  \n\n \n\n", 800).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_until_limit() {
        let a = "a".repeat(300);
        let b = "b".repeat(300);
        let c = "c".repeat(300);
        let text = format!("{a}\n\n{b}\n\n{c}");
        let chunks = chunk_text(&text, 800);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{a}\n\n{b}"));
        assert_eq!(chunks[1].text, c);
    }

    #[test]
    fn test_separator_counts_toward_limit() {
        let a = "a".repeat(399);
        let b = "b".repeat(399);
        let text = format!("{a}\n\n{b}");
        // 399 + 2 + 399 = 800 fits exactly
        assert_eq!(chunk_text(&text, 800).len(), 1);
        let b = "b".repeat(400);
        let text = format!("{a}\n\n{b}");
        assert_eq!(chunk_text(&text, 800).len(), 2);
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let big = "word ".repeat(300);
        let text = format!("intro\n\n{}\n\noutro", big.trim());
        let chunks = chunk_text(&text, 800);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "intro");
        assert!(chunks[1].oversized);
        assert_eq!(chunks[1].text, big.trim());
        assert_eq!(chunks[2].text, "outro");
    }

    #[test]
    fn test_lengths_counted_in_chars() {
        let para = "é".repeat(500);
        let text = format!("{para}\n\n{para}");
        let chunks = chunk_text(&text, 800);
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert_eq!(c.text.chars().count(), 500);
        }
    }

    #[test]
    fn test_indices_contiguous_and_hash_deterministic() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let c1 = chunk_text(&text, 60);
        let c2 = chunk_text(&text, 60);
        for (i, (a, b)) in c1.iter().zip(c2.iter()).enumerate() {
            assert_eq!(a.chunk_index, i as i64);
            assert_eq!(a.hash, b.hash);
        }
    }
}
