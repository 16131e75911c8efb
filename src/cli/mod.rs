//! CLI module for the workflow compiler
//!
//! Provides subcommands:
//! - `list`: registered workflows
//! - `validate`: load and validate a workflows directory
//! - `compile`: compile a goal into instructions
//! - `clarify`: answer a parameter question and store it

pub mod clarify;
pub mod compile;
pub mod prompt;
pub mod workflows;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::domain::CompileError;
use crate::infrastructure::logging;

/// Workflow compiler - turns a goal and a workflow template into tool calls
#[derive(Parser)]
#[command(name = "workflow-compiler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List registered workflows
    List(workflows::ListArgs),

    /// Validate every workflow definition in a directory
    Validate(workflows::ValidateArgs),

    /// Compile a goal into an instruction list
    Compile(compile::CompileArgs),

    /// Submit a clarification answer so later compilations reuse it
    Clarify(clarify::ClarifyArgs),
}

/// Load configuration and install logging
fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;
    Ok(config)
}

/// A command-line value: JSON when it parses as JSON, a plain string otherwise
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `name=value` pair for `--param`
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    Ok((key.to_string(), parse_value(value.trim())))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

/// Print the typed error outcome and hand the error back for the exit status
fn report_error(err: CompileError, pretty: bool) -> anyhow::Error {
    let outcome = json!({
        "status": "error",
        "code": err.code(),
        "message": err.to_string(),
    });
    if let Err(e) = print_json(&outcome, pretty) {
        return e;
    }
    err.into()
}
