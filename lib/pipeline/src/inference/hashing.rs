use super::{Availability, InferenceCapability, TextChunks};
use crate::error::InferenceError;
use ahash::RandomState;
use async_trait::async_trait;
use shopwise_core::Vector;
use std::hash::BuildHasher;

// Fixed seeds keep vectors stable across processes, so an index built by
// `ingest` matches queries embedded by `serve`.
const SEEDS: (u64, u64, u64, u64) = (
    0x5348_4f50_5749_5345,
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
);

/// Deterministic bag-of-trigrams text embedder.
///
/// Needs no model, so it is always ready for text; image operations report
/// [`InferenceError::Unavailable`].
#[derive(Debug, Clone)]
pub struct HashingInference {
    dimension: usize,
    hasher: RandomState,
}

impl HashingInference {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            hasher: RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3),
        }
    }

    pub fn embed(&self, text: &str) -> Vector {
        let mut buckets = vec![0.0f32; self.dimension];
        let normalized = text.to_lowercase();

        let chars: Vec<char> = normalized.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let slot = (self.hasher.hash_one(trigram.as_str()) % self.dimension as u64) as usize;
            buckets[slot] += 1.0;
        }

        // Whole words weigh more than their trigrams.
        for word in normalized.split_whitespace() {
            let slot = (self.hasher.hash_one(word) % self.dimension as u64) as usize;
            buckets[slot] += 2.0;
        }

        let mut vector = Vector::new(buckets);
        vector.normalize();
        vector
    }
}

#[async_trait]
impl InferenceCapability for HashingInference {
    fn name(&self) -> &str {
        "hashing"
    }

    fn availability(&self) -> Availability {
        Availability::Ready
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vector, InferenceError> {
        Ok(self.embed(text))
    }

    async fn embed_image(&self, _image: &[u8]) -> Result<Vector, InferenceError> {
        Err(InferenceError::Unavailable(
            "image embedding needs a remote inference server".to_string(),
        ))
    }

    async fn describe(&self, _image: &[u8], _prompt: &str) -> Result<TextChunks, InferenceError> {
        Err(InferenceError::Unavailable(
            "image description needs a remote inference server".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let a = HashingInference::new(64);
        let b = HashingInference::new(64);
        let v1 = a.embed("Stainless steel espresso machine");
        let v2 = b.embed("stainless STEEL espresso machine");
        assert_eq!(v1, v2);
        assert_eq!(v1.dim(), 64);
        let norm: f32 = v1.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_is_closer() {
        let embedder = HashingInference::new(256);
        let query = embedder.embed("espresso machine");
        let close = embedder.embed("espresso machine with grinder");
        let far = embedder.embed("garden hose reel");
        assert!(query.l2_squared(&close) < query.l2_squared(&far));
    }

    #[tokio::test]
    async fn test_images_are_unavailable() {
        let embedder = HashingInference::new(16);
        assert!(embedder.availability().is_ready());
        assert!(matches!(
            embedder.embed_image(b"png").await,
            Err(InferenceError::Unavailable(_))
        ));
        assert!(embedder.describe(b"png", "what?").await.is_err());
    }
}
