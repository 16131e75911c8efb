//! Parameter memory persisted to a JSON file

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::in_memory::rank;
use crate::domain::memory::{MemoryMatch, MemoryQuery, ParameterMemory, StoredMapping};
use crate::domain::DomainError;

/// Memory that keeps every mapping in one JSON array on disk.
///
/// The whole file is rewritten after each mutation, through a sibling
/// temporary file and a rename.
#[derive(Debug)]
pub struct JsonFileParameterMemory {
    path: PathBuf,
    mappings: RwLock<Vec<StoredMapping>>,
}

impl JsonFileParameterMemory {
    /// Load `path`, or start empty when it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let path = path.into();

        let mappings = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                DomainError::storage(format!("Corrupt memory file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(DomainError::storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        debug!(path = %path.display(), count = mappings.len(), "Parameter memory loaded");

        Ok(Self {
            path,
            mappings: RwLock::new(mappings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, mappings: &[StoredMapping]) -> Result<(), DomainError> {
        let content = serde_json::to_string_pretty(mappings)
            .map_err(|e| DomainError::storage(format!("Failed to serialize memory: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DomainError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DomainError::storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl ParameterMemory for JsonFileParameterMemory {
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryMatch>, DomainError> {
        let mappings = self.mappings.read().await;
        Ok(rank(mappings.iter(), query))
    }

    async fn upsert(&self, mapping: StoredMapping) -> Result<StoredMapping, DomainError> {
        let mut mappings = self.mappings.write().await;

        let stored = match mappings.iter_mut().find(|m| m.same_key(&mapping)) {
            Some(existing) => {
                existing.absorb(mapping);
                existing.clone()
            }
            None => {
                mappings.push(mapping.clone());
                mapping
            }
        };

        self.persist(&mappings).await?;
        Ok(stored)
    }

    async fn record_usage(&self, id: &Uuid) -> Result<u64, DomainError> {
        let mut mappings = self.mappings.write().await;

        let count = mappings
            .iter_mut()
            .find(|m| m.id() == id)
            .map(StoredMapping::record_usage)
            .ok_or_else(|| DomainError::not_found(format!("Mapping '{}' not found", id)))?;

        self.persist(&mappings).await?;
        Ok(count)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<StoredMapping>, DomainError> {
        let mappings = self.mappings.read().await;
        Ok(mappings.iter().find(|m| m.id() == id).cloned())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.mappings.read().await.len())
    }
}
