//! Clarification questions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::workflow::{ParameterSchema, ParameterType};

/// A parameter the resolver could not settle without asking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnresolvedParameter {
    pub name: String,
    /// Excerpt of the goal that mentioned the parameter
    pub context_text: String,
    pub relevance: f32,
}

/// What the caller is asked for one parameter, or one group of them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterQuestion {
    pub parameter: String,
    pub context: String,
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    pub default: Value,

    #[serde(rename = "type")]
    pub param_type: ParameterType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Every parameter the answer will be applied to, when asked for a group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,

    /// Why the previous answer was refused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

impl ParameterQuestion {
    pub fn for_parameter(schema: &ParameterSchema, context: impl Into<String>) -> Self {
        Self {
            parameter: schema.name.clone(),
            context: context.into(),
            description: schema.description.clone(),
            range: schema.range,
            allowed: schema.allowed.clone(),
            default: schema.default.clone(),
            param_type: schema.param_type,
            group: None,
            members: Vec::new(),
            rejected: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>, members: Vec<String>) -> Self {
        self.group = Some(group.into());
        self.members = members;
        self
    }

    pub fn with_rejection(mut self, reason: impl Into<String>) -> Self {
        self.rejected = Some(reason.into());
        self
    }
}
