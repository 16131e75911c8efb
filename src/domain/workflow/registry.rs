//! Workflow registry
//!
//! A [`WorkflowRegistry`] never changes after construction. Reloading builds a
//! new registry and swaps it into the [`RegistryHandle`] as a whole; requests
//! already holding a snapshot keep compiling against the old one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::entity::WorkflowDefinition;
use super::error::CompileError;
use super::validation::validate_definition;
use crate::domain::DomainError;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").unwrap());

/// Immutable set of validated workflow definitions
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: Vec<Arc<WorkflowDefinition>>,
    index: HashMap<String, usize>,
}

impl WorkflowRegistry {
    /// Validate and index definitions; order is preserved
    pub fn new(definitions: Vec<WorkflowDefinition>) -> Result<Self, CompileError> {
        let mut workflows = Vec::with_capacity(definitions.len());
        let mut index = HashMap::new();

        for definition in definitions {
            validate_definition(&definition)?;
            if index.contains_key(&definition.name) {
                return Err(CompileError::invalid_definition(
                    definition.name.clone(),
                    "duplicate workflow name",
                ));
            }
            index.insert(definition.name.clone(), workflows.len());
            workflows.push(Arc::new(definition));
        }

        Ok(Self { workflows, index })
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.index.get(name).map(|&i| Arc::clone(&self.workflows[i]))
    }

    pub fn list(&self) -> &[Arc<WorkflowDefinition>] {
        &self.workflows
    }

    pub fn names(&self) -> Vec<&str> {
        self.workflows.iter().map(|w| w.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// First workflow, in registry order, with a trigger keyword contained in `goal`.
    ///
    /// Matching is case-insensitive on whole words.
    pub fn match_trigger(&self, goal: &str) -> Option<Arc<WorkflowDefinition>> {
        let goal_words = words(goal);
        self.workflows
            .iter()
            .find(|workflow| {
                workflow.trigger_keywords.iter().any(|keyword| {
                    let keyword_words = words(keyword);
                    !keyword_words.is_empty()
                        && goal_words
                            .windows(keyword_words.len())
                            .any(|window| window == keyword_words.as_slice())
                })
            })
            .cloned()
    }
}

fn words(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Shared handle to the current registry
#[derive(Debug, Default)]
pub struct RegistryHandle {
    current: RwLock<Arc<WorkflowRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: WorkflowRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// The registry as of now
    pub fn snapshot(&self) -> Arc<WorkflowRegistry> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a whole new registry
    pub fn replace(&self, registry: WorkflowRegistry) -> Arc<WorkflowRegistry> {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        info!(workflows = next.len(), "Workflow registry replaced");
        std::mem::replace(&mut *guard, next)
    }
}

/// Where workflow definitions come from
#[async_trait]
pub trait WorkflowSource: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> Result<Vec<WorkflowDefinition>, DomainError>;
}

/// Load definitions from `source` and build a registry
pub async fn load_registry(source: &dyn WorkflowSource) -> Result<WorkflowRegistry, CompileError> {
    let definitions = source.load().await?;
    WorkflowRegistry::new(definitions)
}

/// Reload from `source` and swap the result into `handle`
pub async fn reload_registry(
    handle: &RegistryHandle,
    source: &dyn WorkflowSource,
) -> Result<Arc<WorkflowRegistry>, CompileError> {
    let registry = load_registry(source).await?;
    handle.replace(registry);
    Ok(handle.snapshot())
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// In-memory workflow source for testing
    #[derive(Debug, Default)]
    pub struct MockWorkflowSource {
        definitions: Mutex<Vec<WorkflowDefinition>>,
        should_fail: Mutex<Option<String>>,
    }

    impl MockWorkflowSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_definition(self, definition: WorkflowDefinition) -> Self {
            self.definitions.lock().unwrap().push(definition);
            self
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.should_fail.lock().unwrap() = Some(error.into());
            self
        }
    }

    #[async_trait]
    impl WorkflowSource for MockWorkflowSource {
        async fn load(&self) -> Result<Vec<WorkflowDefinition>, DomainError> {
            if let Some(ref msg) = *self.should_fail.lock().unwrap() {
                return Err(DomainError::storage(msg.clone()));
            }
            Ok(self.definitions.lock().unwrap().clone())
        }
    }
}
