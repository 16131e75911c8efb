//! Parameter memory trait and query types

use async_trait::async_trait;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use super::StoredMapping;
use crate::domain::DomainError;

/// Lookup of learned values for one workflow parameter
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQuery {
    pub workflow_name: String,
    pub parameter: String,
    pub embedding: Vec<f32>,
    /// Minimum cosine similarity
    pub min_similarity: f32,
    pub limit: usize,
}

impl MemoryQuery {
    pub fn new(
        workflow_name: impl Into<String>,
        parameter: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            parameter: parameter.into(),
            embedding,
            min_similarity: 0.85,
            limit: 1,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, mapping: &StoredMapping) -> bool {
        mapping.workflow_name() == self.workflow_name && mapping.parameter() == self.parameter
    }
}

/// A stored mapping and how close it is to the query
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub mapping: StoredMapping,
    pub similarity: f32,
}

impl MemoryMatch {
    pub fn new(mapping: StoredMapping, similarity: f32) -> Self {
        Self {
            mapping,
            similarity,
        }
    }
}

/// Store of learned parameter mappings
///
/// Reads never mutate; `record_usage` must increment atomically.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ParameterMemory: Send + Sync {
    /// Matches at or above the query's threshold, best first
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryMatch>, DomainError>;

    /// Insert, or update the value of the record with the same key
    async fn upsert(&self, mapping: StoredMapping) -> Result<StoredMapping, DomainError>;

    /// Increment usage; returns the new count
    async fn record_usage(&self, id: &Uuid) -> Result<u64, DomainError>;

    async fn get(&self, id: &Uuid) -> Result<Option<StoredMapping>, DomainError>;

    async fn count(&self) -> Result<usize, DomainError>;
}
