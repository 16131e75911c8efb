//! Workflow definition validation

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::computed::computed_order;
use super::entity::{LoopIteration, WorkflowDefinition};
use super::error::{CompileError, DependencyKind};
use super::ordering::{find_step_cycle, OrderNode};

/// Maximum length for workflow names
pub const MAX_NAME_LENGTH: usize = 100;

/// Names bound by the simulated host state; conditions would never see a
/// parameter that reuses one
pub const SIMULATED_STATE_KEYS: [&str; 3] = ["current_mode", "has_selection", "selected_count"];

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Validate a workflow name
pub fn validate_workflow_name(name: &str) -> Result<(), CompileError> {
    if name.is_empty() {
        return Err(CompileError::invalid_definition(name, "Workflow name cannot be empty"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(CompileError::invalid_definition(
            name,
            format!("Workflow name exceeds maximum length of {} characters", MAX_NAME_LENGTH),
        ));
    }

    if !NAME_PATTERN.is_match(name) {
        return Err(CompileError::invalid_definition(
            name,
            "must be alphanumeric with underscores or hyphens, starting with alphanumeric",
        ));
    }

    Ok(())
}

/// Check a definition for everything that can be rejected before any request
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), CompileError> {
    let name = definition.name.as_str();
    validate_workflow_name(name)?;

    let mut declared = HashSet::new();
    for parameter in &definition.parameters {
        if !IDENTIFIER_PATTERN.is_match(&parameter.name) {
            return Err(CompileError::invalid_definition(
                name,
                format!("parameter name '{}' is not an identifier", parameter.name),
            ));
        }
        if SIMULATED_STATE_KEYS.contains(&parameter.name.as_str()) {
            return Err(CompileError::invalid_definition(
                name,
                format!("parameter name '{}' is reserved for simulated state", parameter.name),
            ));
        }
        if !declared.insert(parameter.name.as_str()) {
            return Err(CompileError::invalid_definition(
                name,
                format!("parameter '{}' declared twice", parameter.name),
            ));
        }
        if let Some((min, max)) = parameter.range {
            if min > max {
                return Err(CompileError::invalid_definition(
                    name,
                    format!("parameter '{}' has range [{}, {}] with min > max", parameter.name, min, max),
                ));
            }
        }
        if !parameter.is_computed() {
            parameter
                .validate(&parameter.default)
                .map_err(|e| CompileError::invalid_definition(name, format!("default: {}", e)))?;
        }
    }

    for parameter in &definition.parameters {
        for dependency in &parameter.depends_on {
            if !declared.contains(dependency.as_str()) {
                return Err(CompileError::invalid_definition(
                    name,
                    format!(
                        "parameter '{}' depends on undeclared parameter '{}'",
                        parameter.name, dependency
                    ),
                ));
            }
        }
    }

    computed_order(definition)?;

    for modifier in &definition.modifiers {
        if modifier.phrase.trim().is_empty() {
            return Err(CompileError::invalid_definition(name, "modifier phrase cannot be empty"));
        }
        for (parameter, value) in &modifier.values {
            let Some(schema) = definition.parameter(parameter) else {
                return Err(CompileError::invalid_definition(
                    name,
                    format!("modifier '{}' sets undeclared parameter '{}'", modifier.phrase, parameter),
                ));
            };
            schema.validate(value).map_err(|e| {
                CompileError::invalid_definition(name, format!("modifier '{}': {}", modifier.phrase, e))
            })?;
        }
    }

    for (key, value) in &definition.defaults {
        if SIMULATED_STATE_KEYS.contains(&key.as_str()) {
            return Err(CompileError::invalid_definition(
                name,
                format!("defaults key '{}' is reserved for simulated state", key),
            ));
        }
        if let Some(schema) = definition.parameter(key) {
            schema
                .validate(value)
                .map_err(|e| CompileError::invalid_definition(name, format!("defaults: {}", e)))?;
        }
    }

    for step in &definition.steps {
        if step.tool.trim().is_empty() {
            return Err(CompileError::invalid_definition(
                name,
                format!("step '{}' has no tool", step.label()),
            ));
        }
        if let Some(loop_spec) = &step.loop_spec {
            if let LoopIteration::Product { variables, ranges } = &loop_spec.iteration {
                if variables.is_empty() || variables.len() != ranges.len() {
                    return Err(CompileError::invalid_loop(
                        step.label(),
                        format!("{} variables but {} ranges", variables.len(), ranges.len()),
                    ));
                }
            }
            let variables = loop_spec.variables();
            let mut seen = HashSet::new();
            for variable in variables {
                if !IDENTIFIER_PATTERN.is_match(variable) || !seen.insert(variable) {
                    return Err(CompileError::invalid_loop(
                        step.label(),
                        format!("bad or repeated loop variable '{}'", variable),
                    ));
                }
            }
        }
    }

    // only loop-free steps with literal ids can be checked before expansion
    let literal: Vec<OrderNode<'_>> = definition
        .steps
        .iter()
        .filter(|step| step.loop_spec.is_none())
        .filter(|step| step.id.as_deref().is_some_and(|id| !id.contains('{')))
        .map(|step| OrderNode {
            id: step.id.as_deref(),
            depends_on: &step.depends_on,
        })
        .collect();
    if let Some(cycle) = find_step_cycle(&literal) {
        return Err(CompileError::cyclic_dependency(DependencyKind::Steps, cycle));
    }

    Ok(())
}
