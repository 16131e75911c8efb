//! `list` and `validate` commands

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tracing::info;

use super::{bootstrap, print_json, report_error};
use crate::domain::workflow::{load_registry, WorkflowRegistry};
use crate::domain::{CompileError, WorkflowDefinition};
use crate::infrastructure::FileWorkflowSource;

#[derive(Args, Clone)]
pub struct ListArgs {
    /// Workflows directory (overrides config)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Workflows directory (overrides config)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct WorkflowSummary<'a> {
    name: &'a str,
    description: &'a str,
    trigger_keywords: &'a [String],
    parameters: Vec<&'a str>,
    steps: usize,
}

impl<'a> From<&'a WorkflowDefinition> for WorkflowSummary<'a> {
    fn from(definition: &'a WorkflowDefinition) -> Self {
        Self {
            name: &definition.name,
            description: &definition.description,
            trigger_keywords: &definition.trigger_keywords,
            parameters: definition.parameters.iter().map(|p| p.name.as_str()).collect(),
            steps: definition.steps.len(),
        }
    }
}

async fn load(dir: Option<PathBuf>) -> anyhow::Result<Result<WorkflowRegistry, CompileError>> {
    let config = bootstrap()?;
    let dir = dir.unwrap_or(config.registry.workflows_dir);
    info!(dir = %dir.display(), "Loading workflows");
    Ok(load_registry(&FileWorkflowSource::new(dir)).await)
}

pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    let registry = load(args.dir).await?.map_err(|e| report_error(e, args.pretty))?;

    let summaries: Vec<WorkflowSummary> = registry
        .list()
        .iter()
        .map(|definition| WorkflowSummary::from(definition.as_ref()))
        .collect();
    print_json(&summaries, args.pretty)
}

pub async fn validate(args: ValidateArgs) -> anyhow::Result<()> {
    let registry = load(args.dir).await?.map_err(|e| report_error(e, args.pretty))?;

    print_json(
        &serde_json::json!({
            "status": "valid",
            "workflows": registry.names(),
        }),
        args.pretty,
    )
}
