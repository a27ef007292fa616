//! Vector utilities and the deterministic fallback embedding.
//!
//! Concrete embedding providers (OpenAI, Ollama) live in the `tenant-rag`
//! app crate. This module holds the pure pieces they share: BLOB encoding,
//! cosine similarity, and the hash-derived vector used whenever no
//! provider is configured or a provider call fails.

use sha2::{Digest, Sha256};

/// Default dimensionality of the fallback embedding.
pub const DEFAULT_FALLBACK_DIMS: usize = 256;

/// Model identifier recorded for fallback vectors.
pub const FALLBACK_MODEL: &str = "sha256-fallback";

/// Deterministic fallback embedding.
///
/// Hashes `text` with SHA-256 and derives `dims` coordinates in `[0, 1]`
/// as `digest[i % 32] / 255`. The same input always yields the same
/// vector; there is no I/O and no failure path.
///
/// These vectors carry no semantic signal beyond exact-text identity.
/// Ranking still works because the lexical boost and document hints
/// do not depend on the embedding.
pub fn hash_embedding(text: &str, dims: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    (0..dims)
        .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use tenant_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors, zero-magnitude vectors, and vectors
/// of different lengths. A provider vector compared against a fallback
/// vector therefore contributes nothing rather than failing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_deterministic() {
        let a = hash_embedding("parental leave policy", 256);
        let b = hash_embedding("parental leave policy", 256);
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
    }

    #[test]
    fn test_hash_embedding_range_and_cycle() {
        let v = hash_embedding("x", 70);
        assert!(v.iter().all(|c| (0.0..=1.0).contains(c)));
        assert_eq!(v[0], v[32]);
        assert_eq!(v[5], v[37]);
        assert_eq!(v[1], v[65]);
    }

    #[test]
    fn test_hash_embedding_matches_digest() {
        let digest = Sha256::digest(b"abc");
        let v = hash_embedding("abc", 4);
        assert_eq!(v[0], f32::from(digest[0]) / 255.0);
        assert_eq!(v[3], f32::from(digest[3]) / 255.0);
    }

    #[test]
    fn test_hash_embedding_differs_by_text() {
        assert_ne!(hash_embedding("medical", 32), hash_embedding("maternity", 32));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatch_and_empty() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_blob_preserves_values() {
        let v = vec![0.25f32, -1.5, 1e-7];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }
}
