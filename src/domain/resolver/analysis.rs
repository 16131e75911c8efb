//! Goal text analysis shared by all tiers

use unicode_segmentation::UnicodeSegmentation;

use crate::domain::embedding::{cosine_similarity, EmbeddingProvider};
use crate::domain::DomainError;

/// Longest n-gram compared against phrases and hints
pub const MAX_NGRAM: usize = 3;

/// Lowercased words of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Word n-grams of length 1 through [`MAX_NGRAM`], shortest first
pub fn ngrams(words: &[String]) -> Vec<String> {
    let mut grams = Vec::new();
    for n in 1..=MAX_NGRAM.min(words.len()) {
        for window in words.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}

/// A goal broken into words and n-grams, with embeddings computed once
#[derive(Debug, Clone)]
pub struct GoalAnalysis {
    goal: String,
    words: Vec<String>,
    ngrams: Vec<String>,
    ngram_embeddings: Vec<Vec<f32>>,
    goal_embedding: Vec<f32>,
}

impl GoalAnalysis {
    pub async fn build(goal: &str, embedder: &dyn EmbeddingProvider) -> Result<Self, DomainError> {
        let words = tokenize(goal);
        let ngrams = ngrams(&words);
        let ngram_embeddings = embedder.embed_batch(&ngrams).await?;
        let goal_embedding = embedder.embed(goal).await?;

        Ok(Self {
            goal: goal.to_string(),
            words,
            ngrams,
            ngram_embeddings,
            goal_embedding,
        })
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn ngrams(&self) -> &[String] {
        &self.ngrams
    }

    pub fn goal_embedding(&self) -> &[f32] {
        &self.goal_embedding
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    /// Whether `sequence` appears as consecutive words of the goal
    pub fn contains_sequence(&self, sequence: &[String]) -> bool {
        !sequence.is_empty()
            && self
                .words
                .windows(sequence.len())
                .any(|window| window == sequence)
    }

    /// The n-gram most similar to `embedding`, and its similarity
    pub fn best_ngram(&self, embedding: &[f32]) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (gram, vector) in self.ngrams.iter().zip(&self.ngram_embeddings) {
            let similarity = cosine_similarity(embedding, vector);
            if best.is_none_or(|(_, current)| similarity > current) {
                best = Some((gram.as_str(), similarity));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Create a picnic-table, with STRAIGHT legs!"),
            vec!["create", "a", "picnic", "table", "with", "straight", "legs"]
        );
    }

    #[test]
    fn test_ngrams() {
        let words = tokenize("table with straight legs");
        let grams = ngrams(&words);
        assert_eq!(grams.len(), 4 + 3 + 2);
        assert_eq!(grams[0], "table");
        assert!(grams.contains(&"straight legs".to_string()));
        assert!(grams.contains(&"with straight legs".to_string()));
    }

    #[tokio::test]
    async fn test_analysis_sequences() {
        let embedder = MockEmbeddingProvider::new(128);
        let analysis = GoalAnalysis::build("table with straight legs", &embedder)
            .await
            .unwrap();

        assert!(analysis.contains_word("straight"));
        assert!(analysis.contains_sequence(&tokenize("straight legs")));
        assert!(!analysis.contains_sequence(&tokenize("legs straight")));
        assert!(!analysis.contains_sequence(&[]));
    }

    #[tokio::test]
    async fn test_best_ngram() {
        let embedder = MockEmbeddingProvider::new(3)
            .with_vector("legs", vec![1.0, 0.0, 0.0])
            .with_vector("limbs", vec![0.9, 0.1, 0.0]);
        let analysis = GoalAnalysis::build("legs", &embedder).await.unwrap();

        let limbs = embedder.embed("limbs").await.unwrap();
        let (gram, similarity) = analysis.best_ngram(&limbs).unwrap();
        assert_eq!(gram, "legs");
        assert!(similarity > 0.99);
    }
}
