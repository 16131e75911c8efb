//! Synchronous compilation stages
//!
//! Each function is one stage of the pipeline run by
//! [`Compiler::compile`](super::Compiler::compile). They are kept separate so
//! the order they run in stays visible in one place.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use super::dto::Instruction;
use super::simulation::StateSimulator;
use crate::domain::expression::{
    calculate_body, reference_name, CompiledExpression, ExpressionError, StackedScope,
    VariableScope,
};
use crate::domain::resolver::{side_qualifiers, ParameterQuestion, UnresolvedParameter};
use crate::domain::workflow::{
    check_acyclic, topological_order, CompileError, EvaluationContext, ExpandedStep, OrderNode, ParameterSource,
    StepOverrides, WorkflowDefinition, WorkflowStep,
};

/// A step after parameter substitution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub step: WorkflowStep,
    pub bindings: BTreeMap<String, Value>,
    /// Every variable the step read, loop variables included
    pub referenced: BTreeSet<String>,
}

/// Stage 1: schema defaults, then workflow defaults, then the caller's values
pub fn initial_context(
    definition: &WorkflowDefinition,
    explicit: &BTreeMap<String, Value>,
) -> Result<EvaluationContext, CompileError> {
    let mut context = EvaluationContext::new();

    for schema in definition.parameters.iter().filter(|p| !p.is_computed()) {
        context.bind(schema.name.clone(), schema.default.clone(), ParameterSource::Default);
    }
    for (name, value) in &definition.defaults {
        context.bind(name.clone(), value.clone(), ParameterSource::Default);
    }

    for (name, value) in explicit {
        let value = match definition.parameter(name) {
            Some(schema) => schema.validate(value)?,
            None if definition.defaults.contains_key(name) => value.clone(),
            None => return Err(CompileError::unknown_parameter(name.clone(), definition.name.clone())),
        };
        context.bind(name.clone(), value, ParameterSource::Explicit);
    }

    debug!(stage = "defaults", bound = context.len(), explicit = explicit.len(), "Context built");
    Ok(context)
}

/// Questions for the unresolved parameters; group members share one question
/// unless the goal singled one out by side
pub fn questions(
    definition: &WorkflowDefinition,
    unresolved: &[UnresolvedParameter],
) -> Vec<ParameterQuestion> {
    let mut asked_groups: HashSet<&str> = HashSet::new();
    let mut questions = Vec::with_capacity(unresolved.len());

    for parameter in unresolved {
        let Some(schema) = definition.parameter(&parameter.name) else {
            continue;
        };
        let mut question = ParameterQuestion::for_parameter(schema, parameter.context_text.clone());

        if let Some(group) = schema.group.as_deref() {
            if side_qualifiers(&parameter.context_text).is_empty() {
                if !asked_groups.insert(group) {
                    continue;
                }
                let members = definition
                    .group_members(group)
                    .iter()
                    .map(|p| p.name.clone())
                    .collect();
                question = question.with_group(group, members);
            } else {
                question.group = Some(group.to_string());
            }
        }
        questions.push(question);
    }

    questions
}

/// Stage 5: `$CALCULATE(...)` and `$name` values in step parameters
pub fn substitute_params(
    expanded: ExpandedStep,
    context: &EvaluationContext,
) -> Result<ResolvedStep, CompileError> {
    let ExpandedStep {
        step,
        bindings,
        mut referenced,
        ..
    } = expanded;
    referenced.extend(bindings.keys().cloned());

    let scope = StackedScope::new(&bindings, context);
    let mut params = Map::with_capacity(step.params.len());
    for (key, value) in &step.params {
        let value = substitute_value(value, &scope, &mut referenced)
            .map_err(|e| CompileError::from(e).in_step(step.label()))?;
        params.insert(key.clone(), value);
    }

    let step = step.clone_with(StepOverrides {
        params: Some(params),
        ..Default::default()
    });

    Ok(ResolvedStep {
        step,
        bindings,
        referenced,
    })
}

fn substitute_value(
    value: &Value,
    scope: &dyn VariableScope,
    referenced: &mut BTreeSet<String>,
) -> Result<Value, ExpressionError> {
    match value {
        Value::String(text) => {
            if let Some(body) = calculate_body(text) {
                let expression = CompiledExpression::parse(body)?;
                let result = expression.evaluate(scope)?;
                referenced.extend(expression.identifiers());
                Ok(result.to_json())
            } else if let Some(name) = reference_name(text) {
                let found = scope
                    .lookup(name)
                    .ok_or_else(|| ExpressionError::unknown_symbol(name, text.as_str()))?;
                referenced.insert(name.to_string());
                Ok(found.clone())
            } else {
                Ok(value.clone())
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_value(item, scope, referenced))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, item) in fields {
                out.insert(key.clone(), substitute_value(item, scope, referenced)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// The full expanded step graph must be acyclic before conditions drop anything
pub fn check_step_graph(steps: &[ResolvedStep]) -> Result<(), CompileError> {
    let nodes: Vec<OrderNode<'_>> = steps
        .iter()
        .map(|s| OrderNode {
            id: s.step.id.as_deref(),
            depends_on: &s.step.depends_on,
        })
        .collect();
    check_acyclic(&nodes)
}

/// Stage 6: evaluate conditions in order.
///
/// A false condition skips the step. A condition that cannot be evaluated
/// drops an optional step and fails a required one. Returns the surviving
/// steps and the ids of the skipped ones.
pub fn apply_conditions(
    steps: Vec<ResolvedStep>,
    context: &EvaluationContext,
    simulator: Option<&StateSimulator>,
) -> Result<(Vec<ResolvedStep>, HashSet<String>), CompileError> {
    let mut state = simulator.map(StateSimulator::start).unwrap_or_default();
    let mut accepted = Vec::with_capacity(steps.len());
    let mut dropped = HashSet::new();

    for mut resolved in steps {
        let keep = match resolved.step.condition.as_deref() {
            None => true,
            Some(condition) => {
                let with_state = StackedScope::new(&state, context);
                let scope = StackedScope::new(&resolved.bindings, &with_state);
                match evaluate_guard(condition, &scope) {
                    Ok((result, identifiers)) => {
                        resolved
                            .referenced
                            .extend(identifiers.into_iter().filter(|n| !state.contains_key(n)));
                        result
                    }
                    Err(e) if resolved.step.optional => {
                        debug!(step = %resolved.step.label(), error = %e, "Optional step dropped");
                        false
                    }
                    Err(source) => {
                        return Err(CompileError::StepCondition {
                            step: resolved.step.label().to_string(),
                            source,
                        });
                    }
                }
            }
        };

        if keep {
            if let Some(simulator) = simulator {
                simulator.apply(&mut state, &resolved.step);
            }
            accepted.push(resolved);
        } else {
            debug!(step = %resolved.step.label(), "Step skipped by condition");
            if let Some(id) = &resolved.step.id {
                dropped.insert(id.clone());
            }
        }
    }

    Ok((accepted, dropped))
}

fn evaluate_guard(
    condition: &str,
    scope: &dyn VariableScope,
) -> Result<(bool, BTreeSet<String>), ExpressionError> {
    let expression = CompiledExpression::parse(condition)?;
    let result = expression.evaluate_condition(scope)?;
    Ok((result, expression.identifiers()))
}

/// Stage 7: stable dependency order
pub fn order_steps(
    steps: Vec<ResolvedStep>,
    dropped: &HashSet<String>,
) -> Result<Vec<ResolvedStep>, CompileError> {
    let order = {
        let nodes: Vec<OrderNode<'_>> = steps
            .iter()
            .map(|s| OrderNode {
                id: s.step.id.as_deref(),
                depends_on: &s.step.depends_on,
            })
            .collect();
        topological_order(&nodes, dropped)?
    };

    let mut slots: Vec<Option<ResolvedStep>> = steps.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Stage 8: instructions tagged with where each variable came from
pub fn emit(steps: Vec<ResolvedStep>, context: &EvaluationContext) -> Vec<Instruction> {
    steps
        .into_iter()
        .map(|resolved| {
            let provenance = resolved
                .referenced
                .iter()
                .filter_map(|name| {
                    let source = if resolved.bindings.contains_key(name) {
                        Some(ParameterSource::Loop)
                    } else {
                        context.source(name)
                    };
                    source.map(|s| (name.clone(), s))
                })
                .collect();
            Instruction::from_step(resolved.step, provenance)
        })
        .collect()
}
