//! Interactive clarification seam

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::question::ParameterQuestion;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::memory::{ParameterMemory, StoredMapping};
use crate::domain::DomainError;

/// Asks the caller for a parameter value while a compilation is running
///
/// `Ok(None)` means the caller declined to answer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClarificationHandler: Send + Sync {
    async fn ask(
        &self,
        workflow: &str,
        question: &ParameterQuestion,
        attempt: u32,
    ) -> Result<Option<Value>, DomainError>;
}

/// Store an accepted answer once per bound parameter
pub async fn remember_answer(
    memory: &dyn ParameterMemory,
    embedder: &dyn EmbeddingProvider,
    workflow: &str,
    values: &[(String, Value)],
    context: &str,
) -> Result<Vec<StoredMapping>, DomainError> {
    let embedding = embedder.embed(context).await?;
    let mut stored = Vec::with_capacity(values.len());

    for (parameter, value) in values {
        let mapping = StoredMapping::new(workflow, parameter, value.clone(), context, embedding.clone());
        let mapping = memory.upsert(mapping).await?;
        debug!(workflow, parameter = %parameter, id = %mapping.id(), "Stored learned mapping");
        stored.push(mapping);
    }

    Ok(stored)
}
