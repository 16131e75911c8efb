//! `clarify` command

use clap::Args;

use super::{bootstrap, parse_value, print_json, report_error};
use crate::domain::Clarification;

#[derive(Args, Clone)]
pub struct ClarifyArgs {
    #[arg(long)]
    pub workflow: String,

    #[arg(long)]
    pub parameter: String,

    /// JSON value, or plain text for strings
    #[arg(long)]
    pub value: String,

    /// Goal excerpt the answer applies to
    #[arg(long, default_value = "")]
    pub context: String,

    #[arg(long)]
    pub pretty: bool,
}

impl ClarifyArgs {
    fn clarification(&self) -> Clarification {
        Clarification::new(&self.parameter, parse_value(&self.value), &self.context)
    }
}

pub async fn run(args: ClarifyArgs) -> anyhow::Result<()> {
    let config = bootstrap()?;
    let compiler = crate::create_compiler(&config, None).await?;

    let outcome = compiler
        .submit_clarification(&args.workflow, args.clarification())
        .await
        .map_err(|e| report_error(e, args.pretty))?;

    print_json(&outcome, args.pretty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clarification_from_args() {
        let args = ClarifyArgs {
            workflow: "picnic_table".into(),
            parameter: "leg_angle".into(),
            value: "0.4".into(),
            context: "legs angled outward".into(),
            pretty: false,
        };

        assert_eq!(
            args.clarification(),
            Clarification::new("leg_angle", json!(0.4), "legs angled outward")
        );
    }
}
