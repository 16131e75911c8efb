use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Embedding provider wrapper that memoizes vectors per text with a TTL
#[derive(Debug)]
pub struct CachedEmbeddingProvider<P: EmbeddingProvider> {
    inner: P,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(inner: P, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .build();

        Self { inner, cache }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop every cached vector
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        if let Some(cached) = self.cache.get(text).await {
            tracing::trace!(provider = self.inner.provider_name(), "Embedding cache hit");
            return Ok((*cached).clone());
        }

        let vector = self.inner.embed(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;

        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        for text in texts {
            match self.cache.get(text.as_str()).await {
                Some(cached) => vectors.push(Some((*cached).clone())),
                None => {
                    missing.push(text.clone());
                    vectors.push(None);
                }
            }
        }

        if !missing.is_empty() {
            let fetched = self.inner.embed_batch(&missing).await?;
            if fetched.len() != missing.len() {
                return Err(DomainError::provider(
                    self.inner.provider_name(),
                    format!("Expected {} embeddings, got {}", missing.len(), fetched.len()),
                ));
            }

            let mut fetched = missing.into_iter().zip(fetched);
            for slot in vectors.iter_mut().filter(|v| v.is_none()) {
                if let Some((text, vector)) = fetched.next() {
                    self.cache.insert(text, Arc::new(vector.clone())).await;
                    *slot = Some(vector);
                }
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
