//! Deterministic hash-based embedder.
//!
//! Feature-hashes word unigrams and bigrams into a fixed-dimension
//! vector. No model download, no network, fully reproducible — the
//! fallback for keyless local runs and the workhorse for tests. Related
//! texts share tokens and thus buckets, so cosine similarity is
//! meaningful if crude.

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;
use xxhash_rust::xxh3::xxh3_64;

use super::{Embedder, normalize};
use crate::error::EmbedError;

/// Deterministic feature-hashing [`Embedder`].
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates an embedder with the given output dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<&str> = text.unicode_words().collect();

        for window in words.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            self.bump(&mut vector, &bigram);
        }
        for word in &words {
            let lowered = word.to_lowercase();
            self.bump(&mut vector, &lowered);
        }

        normalize(&mut vector);
        vector
    }

    fn bump(&self, vector: &mut [f32], token: &str) {
        let h = xxh3_64(token.as_bytes());
        let bucket = usize::try_from(h % self.dimension as u64).unwrap_or(0);
        // Sign bit from a higher hash bit decorrelates colliding tokens.
        let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed(&["fn main".to_string()]).await.unwrap_or_default();
        let b = embedder.embed(&["fn main".to_string()]).await.unwrap_or_default();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unit_norm_and_dimension() {
        let embedder = HashEmbedder::new(32);
        let out = embedder
            .embed(&["some text here".to_string()])
            .await
            .unwrap_or_default();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 32);
        let norm: f32 = out[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = embedder.embed(&texts).await.unwrap_or_default();
        let alpha = embedder.embed(&["alpha".to_string()]).await.unwrap_or_default();
        assert_eq!(out[0], alpha[0]);
    }

    #[tokio::test]
    async fn test_related_texts_score_higher() {
        let embedder = HashEmbedder::new(256);
        let out = embedder
            .embed(&[
                "python authentication login password".to_string(),
                "python authentication session password".to_string(),
                "cooking pasta tomato garlic".to_string(),
            ])
            .await
            .unwrap_or_default();
        let related = cosine(&out[0], &out[1]);
        let unrelated = cosine(&out[0], &out[2]);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let out = embedder.embed(&[String::new()]).await.unwrap_or_default();
        assert!(out[0].iter().all(|v| *v == 0.0));
    }
}
