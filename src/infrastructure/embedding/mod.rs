//! Embedding provider implementations

mod cached;
mod hashing;
mod openai;

pub use cached::{CachedEmbeddingProvider, DEFAULT_CACHE_CAPACITY};
pub use hashing::{HashingEmbeddingProvider, DEFAULT_DIMENSIONS};
pub use openai::{OpenAiEmbeddingProvider, DEFAULT_EMBEDDING_MODEL};
