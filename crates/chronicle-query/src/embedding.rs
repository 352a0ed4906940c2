//! Embedding provider seam and vector math.
//!
//! Retrieval depends on a provider trait rather than any concrete model so
//! deployments can plug in a remote encoder. The in-process default is a
//! deterministic feature-hashing embedder: no model weights, no network,
//! stable output for identical input.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid input text: {0}")]
    InvalidInput(String),
}

/// Produces a semantic vector for a piece of text. Implementations must be
/// deterministic for identical input within one process lifetime.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Dimensionality of the vectors this provider produces.
    fn dims(&self) -> usize;
}

/// Feature-hashing bag-of-words embedder. Each token hashes to one bucket
/// with a hash-derived sign; the result is unit-normalized so dot product
/// equals cosine similarity.
#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    dims: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for FeatureHashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for FeatureHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput("empty query text".to_string()));
        }

        let mut vector = vec![0f32; self.dims];
        for token in tokenize(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dims;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize(&mut vector);
        Ok(vector)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Always fails. Exercises the degraded keyword-fallback path in tests.
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unavailable("provider offline".to_string()))
    }

    fn dims(&self) -> usize {
        0
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two vectors. Mismatched or zero-length inputs
/// score 0.0 rather than erroring, so one bad stored vector cannot fail a
/// whole search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0f32;
    let mut norm_a = 0f32;
    let mut norm_b = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let embedder = FeatureHashEmbedder::default();
        let a = embedder.embed("validate auth token").await.unwrap();
        let b = embedder.embed("validate auth token").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedding_is_unit_normalized() {
        let embedder = FeatureHashEmbedder::default();
        let v = embedder.embed("parse configuration file").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn similar_text_scores_higher_than_unrelated() {
        let embedder = FeatureHashEmbedder::default();
        let query = embedder.embed("auth token validation").await.unwrap();
        let close = embedder.embed("token validation in auth").await.unwrap();
        let far = embedder.embed("zlib compression ratio").await.unwrap();
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let embedder = FeatureHashEmbedder::default();
        assert!(embedder.embed("   ").await.is_err());
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
