//! Offline embedding by feature hashing

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

pub const DEFAULT_DIMENSIONS: usize = 384;

/// Deterministic embeddings from hashed words and character trigrams.
///
/// Needs no network or model files. Texts that share words or word stems
/// land close together, which is enough for modifier phrases, hints and
/// short goals. Vectors are L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.unicode_words() {
            let word = word.to_lowercase();
            vector[self.bucket(&word)] += 0.5;

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&gram)] += 1.0;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        Ok(self.vectorize(text))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn model(&self) -> &str {
        "char-trigram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_normalised() {
        let provider = HashingEmbeddingProvider::default();
        let a = provider.embed("Straight legs").await.unwrap();
        let b = provider.embed("straight   LEGS").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_related_words_are_closer() {
        let provider = HashingEmbeddingProvider::default();
        let angle = provider.embed("angle").await.unwrap();
        let angled = provider.embed("angled").await.unwrap();
        let bookshelf = provider.embed("bookshelf").await.unwrap();

        assert!(cosine_similarity(&angle, &angled) > cosine_similarity(&angle, &bookshelf));
        assert!(cosine_similarity(&angle, &angled) > 0.5);
    }

    #[tokio::test]
    async fn test_empty_text() {
        let provider = HashingEmbeddingProvider::new(8);
        assert_eq!(provider.embed("").await.unwrap(), vec![0.0; 8]);
    }
}
