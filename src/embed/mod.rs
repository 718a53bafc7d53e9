//! Embedding providers.
//!
//! An [`Embedder`] maps texts to unit-norm vectors of a fixed dimension,
//! preserving input order. The engine holds one process-wide instance
//! behind a lazy one-shot cell — the first call pays any load cost.
//! [`OpenAiEmbedder`] talks to an OpenAI-compatible endpoint;
//! [`HashEmbedder`] is the deterministic offline fallback used by tests
//! and keyless local runs.

mod hash;
mod openai;

pub use hash::HashEmbedder;
pub use openai::OpenAiEmbedder;

use async_trait::async_trait;

use crate::error::EmbedError;

/// Upper bound on text length submitted to the model, in bytes.
///
/// Inputs beyond the cap are truncated at a char boundary before the
/// request so oversized chunks degrade instead of erroring.
pub const MAX_INPUT_BYTES: usize = 16_000;

/// Maps texts to fixed-dimension unit-norm vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts. Output order matches input order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] once transient retries are exhausted or on
    /// a permanent provider failure.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Scales a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Truncates a text to [`MAX_INPUT_BYTES`] at a char boundary.
#[must_use]
pub fn truncate_input(text: &str) -> &str {
    if text.len() <= MAX_INPUT_BYTES {
        return text;
    }
    let mut end = MAX_INPUT_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_truncate_short_input_unchanged() {
        assert_eq!(truncate_input("hello"), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(MAX_INPUT_BYTES);
        let truncated = truncate_input(&text);
        assert!(truncated.len() <= MAX_INPUT_BYTES);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
