//! Compilation error types

use std::fmt;

use thiserror::Error;

use crate::domain::expression::{ExpressionError, InterpolationError};
use crate::domain::DomainError;

/// Which dependency graph contained a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Steps,
    Parameters,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => write!(f, "step"),
            Self::Parameters => write!(f, "computed parameter"),
        }
    }
}

/// Errors that abort a compilation request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("Unresolved placeholder '{{{placeholder}}}' in '{template}'")]
    UnresolvedPlaceholder { placeholder: String, template: String },

    #[error("Malformed template '{template}' at position {position}: {message}")]
    MalformedTemplate {
        template: String,
        position: usize,
        message: String,
    },

    #[error("Step limit of {limit} exceeded: expansion would emit {attempted} steps")]
    StepLimitExceeded { limit: usize, attempted: usize },

    #[error("Cyclic {kind} dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        kind: DependencyKind,
        cycle: Vec<String>,
    },

    #[error("Parameter '{parameter}' value {value} is outside range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: String,
        value: String,
        min: f64,
        max: f64,
    },

    #[error("Parameter '{parameter}' value {value} is not one of [{}]", .allowed.join(", "))]
    ParameterEnumViolation {
        parameter: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Parameter '{parameter}' expects {expected}, got {found}")]
    ParameterType {
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("Unknown parameter '{parameter}' for workflow '{workflow}'")]
    UnknownParameter { parameter: String, workflow: String },

    #[error("Clarification for '{parameter}' timed out after {timeout_secs}s")]
    ClarificationTimeout { parameter: String, timeout_secs: u64 },

    #[error("Loop group '{group}' mismatch: step '{step}' has {found} iterations, expected {expected}")]
    LoopGroupMismatch {
        group: String,
        step: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid loop on step '{step}': {message}")]
    InvalidLoop { step: String, message: String },

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Condition of step '{step}' failed: {source}")]
    StepCondition {
        step: String,
        #[source]
        source: ExpressionError,
    },

    #[error("In step '{step}': {source}")]
    InStep {
        step: String,
        #[source]
        source: Box<CompileError>,
    },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid workflow definition '{workflow}': {message}")]
    InvalidDefinition { workflow: String, message: String },

    #[error(transparent)]
    Collaborator(#[from] DomainError),
}

impl From<InterpolationError> for CompileError {
    fn from(err: InterpolationError) -> Self {
        match err {
            InterpolationError::Unresolved {
                placeholder,
                template,
            } => Self::UnresolvedPlaceholder {
                placeholder,
                template,
            },
            InterpolationError::Malformed {
                template,
                position,
                message,
            } => Self::MalformedTemplate {
                template,
                position,
                message,
            },
        }
    }
}

impl CompileError {
    pub fn step_limit_exceeded(limit: usize, attempted: usize) -> Self {
        Self::StepLimitExceeded { limit, attempted }
    }

    pub fn cyclic_dependency(kind: DependencyKind, cycle: Vec<String>) -> Self {
        Self::CyclicDependency { kind, cycle }
    }

    pub fn parameter_type(
        parameter: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::ParameterType {
            parameter: parameter.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unknown_parameter(parameter: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self::UnknownParameter {
            parameter: parameter.into(),
            workflow: workflow.into(),
        }
    }

    pub fn invalid_loop(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLoop {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn unknown_dependency(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            step: step.into(),
            dependency: dependency.into(),
        }
    }

    pub fn workflow_not_found(name: impl Into<String>) -> Self {
        Self::WorkflowNotFound(name.into())
    }

    pub fn invalid_definition(workflow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            workflow: workflow.into(),
            message: message.into(),
        }
    }

    /// Attach the step label an error was raised in
    pub fn in_step(self, step: impl Into<String>) -> Self {
        match self {
            already @ (Self::InStep { .. } | Self::StepCondition { .. }) => already,
            other => Self::InStep {
                step: step.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping step wrappers
    pub fn root(&self) -> &CompileError {
        match self {
            Self::InStep { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Expression(e) => e.code(),
            Self::UnresolvedPlaceholder { .. } => "unresolved_placeholder",
            Self::MalformedTemplate { .. } => "syntax_error",
            Self::StepLimitExceeded { .. } => "step_limit_exceeded",
            Self::CyclicDependency { .. } => "cyclic_dependency",
            Self::ParameterOutOfRange { .. } => "parameter_out_of_range",
            Self::ParameterEnumViolation { .. } => "parameter_enum_violation",
            Self::ParameterType { .. } => "parameter_type",
            Self::UnknownParameter { .. } => "unknown_parameter",
            Self::ClarificationTimeout { .. } => "clarification_timeout",
            Self::LoopGroupMismatch { .. } => "loop_group_mismatch",
            Self::InvalidLoop { .. } => "invalid_loop",
            Self::DuplicateStepId(_) => "duplicate_step_id",
            Self::UnknownDependency { .. } => "unknown_dependency",
            Self::StepCondition { source, .. } => source.code(),
            Self::InStep { source, .. } => source.code(),
            Self::WorkflowNotFound(_) => "workflow_not_found",
            Self::InvalidDefinition { .. } => "invalid_definition",
            Self::Collaborator(_) => "collaborator_error",
        }
    }
}
