//! `compile` command

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde_json::Value;

use super::prompt::PromptClarificationHandler;
use super::{bootstrap, parse_key_value, print_json, report_error};
use crate::domain::{ClarificationHandler, CompileRequest, WorkflowStep};

#[derive(Args, Clone)]
pub struct CompileArgs {
    /// Natural-language goal
    #[arg(long)]
    pub goal: String,

    /// Workflow to use instead of matching the goal
    #[arg(long)]
    pub workflow: Option<String>,

    /// Explicit parameter value, `name=value`; repeatable
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub params: Vec<(String, Value)>,

    /// JSON file with steps to compile instead of the workflow's own
    #[arg(long)]
    pub steps: Option<PathBuf>,

    /// Ask for mentioned parameters on the terminal instead of returning questions
    #[arg(long)]
    pub interactive: bool,

    #[arg(long)]
    pub pretty: bool,
}

impl CompileArgs {
    async fn request(&self) -> anyhow::Result<CompileRequest> {
        let mut request = CompileRequest::new(&self.goal);
        for (name, value) in &self.params {
            request = request.with_param(name, value.clone());
        }
        if let Some(workflow) = &self.workflow {
            request = request.with_workflow(workflow);
        }
        if let Some(path) = &self.steps {
            let content = tokio::fs::read_to_string(path).await?;
            let steps: Vec<WorkflowStep> = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid steps file {}: {}", path.display(), e))?;
            request = request.with_steps(steps);
        }
        Ok(request)
    }
}

pub async fn run(args: CompileArgs) -> anyhow::Result<()> {
    let config = bootstrap()?;

    let handler: Option<Arc<dyn ClarificationHandler>> = args
        .interactive
        .then(|| Arc::new(PromptClarificationHandler::terminal()) as Arc<dyn ClarificationHandler>);
    let compiler = crate::create_compiler(&config, handler).await?;

    let response = compiler
        .compile(args.request().await?)
        .await
        .map_err(|e| report_error(e, args.pretty))?;

    print_json(&response, args.pretty)
}
