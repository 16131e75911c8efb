//! Compile request and response types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::resolver::ParameterQuestion;
use crate::domain::workflow::{OnFailure, ParameterSource, WorkflowStep};

/// A goal to compile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompileRequest {
    pub goal: String,

    /// Values the caller pins; they win over every other source
    #[serde(default)]
    pub explicit_params: BTreeMap<String, Value>,

    /// Skip workflow selection and compile this workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,

    /// Compile these steps instead of the workflow's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps_override: Option<Vec<WorkflowStep>>,
}

impl CompileRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.explicit_params.insert(name.into(), value);
        self
    }

    pub fn with_workflow(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps_override = Some(steps);
        self
    }
}

/// One concrete tool call handed to the actuator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub tool: String,

    pub params: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<f64>,

    #[serde(default)]
    pub on_failure: OnFailure,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Where each variable the step used came from
    #[serde(default)]
    pub provenance: BTreeMap<String, ParameterSource>,

    /// Step fields the compiler does not interpret, passed through as-is
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Instruction {
    pub fn from_step(step: WorkflowStep, provenance: BTreeMap<String, ParameterSource>) -> Self {
        Self {
            id: step.id,
            tool: step.tool,
            params: step.params,
            description: step.description,
            timeout: step.timeout,
            max_retries: step.max_retries,
            retry_delay: step.retry_delay,
            on_failure: step.on_failure,
            priority: step.priority,
            provenance,
            extensions: step.extensions,
        }
    }
}

/// Outcome of one compilation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileResponse {
    Ready {
        workflow: String,
        instructions: Vec<Instruction>,
    },
    NeedsParameterInput {
        workflow: String,
        questions: Vec<ParameterQuestion>,
    },
    NoMatch,
}

impl CompileResponse {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NeedsParameterInput { .. } => "needs_parameter_input",
            Self::NoMatch => "no_match",
        }
    }

    pub fn instructions(&self) -> Option<&[Instruction]> {
        match self {
            Self::Ready { instructions, .. } => Some(instructions),
            _ => None,
        }
    }

    pub fn questions(&self) -> Option<&[ParameterQuestion]> {
        match self {
            Self::NeedsParameterInput { questions, .. } => Some(questions),
            _ => None,
        }
    }
}

/// A value the caller supplies in answer to a question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clarification {
    pub parameter_name: String,
    pub value: Value,
    /// Goal excerpt the question was asked about
    #[serde(default)]
    pub context: String,
}

impl Clarification {
    pub fn new(parameter_name: impl Into<String>, value: Value, context: impl Into<String>) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            value,
            context: context.into(),
        }
    }
}

/// Result of submitting a clarification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClarificationOutcome {
    /// Stored; re-issue the compile request
    Accepted { stored: Vec<String> },
    /// The value broke the schema; ask again
    Rejected { question: ParameterQuestion },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_status_tag() {
        let ready = CompileResponse::Ready {
            workflow: "picnic_table".into(),
            instructions: vec![Instruction::from_step(
                WorkflowStep::new("modeling_create_primitive").with_param("type", json!("CUBE")),
                BTreeMap::new(),
            )],
        };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["instructions"][0]["tool"], "modeling_create_primitive");
        assert_eq!(json["instructions"][0]["on_failure"], "stop");

        let json = serde_json::to_value(CompileResponse::NoMatch).unwrap();
        assert_eq!(json, json!({"status": "no_match"}));
    }

    #[test]
    fn test_request_defaults() {
        let request: CompileRequest = serde_json::from_value(json!({"goal": "a table"})).unwrap();
        assert_eq!(request, CompileRequest::new("a table"));

        let request = CompileRequest::new("a table")
            .with_workflow("picnic_table")
            .with_param("leg_angle", json!(0.0));
        assert_eq!(request.explicit_params["leg_angle"], json!(0.0));
    }
}
