//! Workflow domain module
//!
//! Declarative workflow templates and the compile-time machinery that turns
//! them into concrete steps:
//! - the data model (parameters, modifiers, steps, loop annotations)
//! - per-request evaluation context layering
//! - computed-parameter ordering
//! - loop expansion with `{var}` interpolation
//! - dependency ordering of steps
//! - the immutable registry and its swap handle

mod computed;
mod context;
mod entity;
mod error;
mod loop_expander;
mod ordering;
pub mod registry;
mod validation;

pub use computed::{apply_computed, computed_order, ComputedParameter};
pub use context::{EvaluationContext, ParameterSource};
pub use entity::{
    LoopIteration, LoopSpec, Modifier, OnFailure, ParameterSchema, ParameterType, RangeBound,
    RangeSpec, StepOverrides, WorkflowDefinition, WorkflowStep,
};
pub use error::{CompileError, DependencyKind};
pub use loop_expander::{ExpandedStep, LoopExpander, DEFAULT_MAX_STEPS};
pub use ordering::{check_acyclic, find_step_cycle, topological_order, OrderNode};
pub use registry::{
    load_registry, reload_registry, RegistryHandle, WorkflowRegistry, WorkflowSource,
};
pub use validation::{
    validate_definition, validate_workflow_name, MAX_NAME_LENGTH, SIMULATED_STATE_KEYS,
};
