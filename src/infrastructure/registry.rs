//! Filesystem workflow source

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::workflow::{WorkflowDefinition, WorkflowSource};
use crate::domain::DomainError;

/// A JSON file may hold one definition or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Many(Vec<WorkflowDefinition>),
    One(Box<WorkflowDefinition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Reads `*.json` and `*.toml` workflow definitions from a directory.
///
/// Files load in file-name order so the registry order is stable across
/// platforms; other files and subdirectories are ignored.
#[derive(Debug, Clone)]
pub struct FileWorkflowSource {
    dir: PathBuf,
}

impl FileWorkflowSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn definition_files(&self) -> Result<Vec<(PathBuf, Format)>, DomainError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            DomainError::configuration(format!(
                "Cannot read workflows directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list {}: {}", self.dir.display(), e)))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if let Some(format) = Format::of(&path).filter(|_| is_file) {
                files.push((path, format));
            }
        }

        files.sort_by(|(a, _), (b, _)| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

fn parse(path: &Path, format: Format, content: &str) -> Result<Vec<WorkflowDefinition>, DomainError> {
    let invalid = |message: String| {
        DomainError::configuration(format!("Invalid workflow file {}: {}", path.display(), message))
    };

    match format {
        Format::Json => match serde_json::from_str(content).map_err(|e| invalid(e.to_string()))? {
            JsonDocument::Many(definitions) => Ok(definitions),
            JsonDocument::One(definition) => Ok(vec![*definition]),
        },
        Format::Toml => toml::from_str(content)
            .map(|definition| vec![definition])
            .map_err(|e| invalid(e.to_string())),
    }
}

#[async_trait]
impl WorkflowSource for FileWorkflowSource {
    async fn load(&self) -> Result<Vec<WorkflowDefinition>, DomainError> {
        let mut definitions = Vec::new();

        for (path, format) in self.definition_files().await? {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                DomainError::storage(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let parsed = parse(&path, format, &content)?;
            debug!(file = %path.display(), count = parsed.len(), "Workflow file parsed");
            definitions.extend(parsed);
        }

        info!(dir = %self.dir.display(), count = definitions.len(), "Workflow definitions loaded");
        Ok(definitions)
    }
}
