//! Embedding collaborator
//!
//! The compiler never computes embeddings itself; it consumes an
//! [`EmbeddingProvider`] and compares vectors with [`cosine_similarity`].

mod provider;
mod similarity;

pub use provider::EmbeddingProvider;
pub use similarity::{best_match, cosine_similarity};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
