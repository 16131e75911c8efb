use clap::Parser;
use workflow_compiler::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::List(args) => cli::workflows::list(args).await,
        Command::Validate(args) => cli::workflows::validate(args).await,
        Command::Compile(args) => cli::compile::run(args).await,
        Command::Clarify(args) => cli::clarify::run(args).await,
    }
}
