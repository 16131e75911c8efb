//! In-memory parameter memory for development and testing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::embedding::cosine_similarity;
use crate::domain::memory::{MemoryMatch, MemoryQuery, ParameterMemory, StoredMapping};
use crate::domain::DomainError;

/// Matches for `query` among `mappings`, best first
pub(super) fn rank<'a>(
    mappings: impl Iterator<Item = &'a StoredMapping>,
    query: &MemoryQuery,
) -> Vec<MemoryMatch> {
    let mut matches: Vec<MemoryMatch> = mappings
        .filter(|mapping| query.matches(mapping))
        .filter_map(|mapping| {
            let similarity = cosine_similarity(mapping.embedding(), &query.embedding);
            (similarity >= query.min_similarity)
                .then(|| MemoryMatch::new(mapping.clone(), similarity))
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.mapping.usage_count().cmp(&a.mapping.usage_count()))
    });
    matches.truncate(query.limit);
    matches
}

/// Memory held in a map keyed by mapping id
#[derive(Debug, Default)]
pub struct InMemoryParameterMemory {
    mappings: Arc<RwLock<HashMap<Uuid, StoredMapping>>>,
}

impl InMemoryParameterMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing mappings
    pub fn with_mappings(mappings: Vec<StoredMapping>) -> Self {
        let mappings = mappings.into_iter().map(|m| (*m.id(), m)).collect();
        Self {
            mappings: Arc::new(RwLock::new(mappings)),
        }
    }
}

#[async_trait]
impl ParameterMemory for InMemoryParameterMemory {
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryMatch>, DomainError> {
        let mappings = self.mappings.read().await;
        Ok(rank(mappings.values(), query))
    }

    async fn upsert(&self, mapping: StoredMapping) -> Result<StoredMapping, DomainError> {
        let mut mappings = self.mappings.write().await;

        if let Some(existing) = mappings.values_mut().find(|m| m.same_key(&mapping)) {
            existing.absorb(mapping);
            return Ok(existing.clone());
        }

        mappings.insert(*mapping.id(), mapping.clone());
        Ok(mapping)
    }

    async fn record_usage(&self, id: &Uuid) -> Result<u64, DomainError> {
        let mut mappings = self.mappings.write().await;
        mappings
            .get_mut(id)
            .map(StoredMapping::record_usage)
            .ok_or_else(|| DomainError::not_found(format!("Mapping '{}' not found", id)))
    }

    async fn get(&self, id: &Uuid) -> Result<Option<StoredMapping>, DomainError> {
        Ok(self.mappings.read().await.get(id).cloned())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.mappings.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(param: &str, value: serde_json::Value, context: &str, embedding: Vec<f32>) -> StoredMapping {
        StoredMapping::new("picnic_table", param, value, context, embedding)
    }

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let memory = InMemoryParameterMemory::new();
        memory
            .upsert(mapping("leg_angle", json!(0.0), "straight", vec![1.0, 0.0]))
            .await
            .unwrap();
        memory
            .upsert(mapping("leg_angle", json!(0.3), "slightly splayed", vec![0.9, 0.1]))
            .await
            .unwrap();
        memory
            .upsert(mapping("leg_angle", json!(0.8), "x-shaped", vec![0.0, 1.0]))
            .await
            .unwrap();
        memory
            .upsert(mapping("table_width", json!(1.2), "straight", vec![1.0, 0.0]))
            .await
            .unwrap();

        let query = MemoryQuery::new("picnic_table", "leg_angle", vec![1.0, 0.0])
            .with_min_similarity(0.9)
            .with_limit(5);
        let matches = memory.search(&query).await.unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].mapping.value(), &json!(0.0));
        assert!(matches[0].similarity >= matches[1].similarity);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let memory = InMemoryParameterMemory::new();
        for i in 0..3 {
            memory
                .upsert(mapping("leg_angle", json!(i), &format!("ctx {}", i), vec![1.0]))
                .await
                .unwrap();
        }

        let query = MemoryQuery::new("picnic_table", "leg_angle", vec![1.0]);
        assert_eq!(memory.search(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_same_key_updates_value() {
        let memory = InMemoryParameterMemory::new();
        let first = memory
            .upsert(mapping("leg_angle", json!(0.2), "splayed", vec![1.0]))
            .await
            .unwrap();
        memory.record_usage(first.id()).await.unwrap();

        let second = memory
            .upsert(mapping("leg_angle", json!(0.4), "splayed", vec![1.0]))
            .await
            .unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.value(), &json!(0.4));
        assert_eq!(second.usage_count(), 1);
        assert_eq!(memory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_usage_concurrent() {
        let memory = Arc::new(InMemoryParameterMemory::new());
        let stored = memory
            .upsert(mapping("leg_angle", json!(0.0), "straight", vec![1.0]))
            .await
            .unwrap();
        let id = *stored.id();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let memory = Arc::clone(&memory);
                tokio::spawn(async move { memory.record_usage(&id).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = memory.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count(), 10);
        assert!(stored.last_used_at().is_some());
    }

    #[tokio::test]
    async fn test_record_usage_unknown_id() {
        let memory = InMemoryParameterMemory::new();
        let err = memory.record_usage(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_with_mappings_seed() {
        let seeded = mapping("leg_angle", json!(0.0), "straight", vec![1.0]);
        let id = *seeded.id();
        let memory = InMemoryParameterMemory::with_mappings(vec![seeded]);

        assert!(memory.get(&id).await.unwrap().is_some());
        assert_eq!(memory.count().await.unwrap(), 1);
    }
}
