//! Loop expansion and `{var}` interpolation of step templates
//!
//! Every step passes through here, looped or not, so placeholders that name
//! workflow parameters are substituted the same way as loop variables. A
//! loop-free step without placeholders comes out unchanged, which makes the
//! expansion idempotent.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use super::entity::{LoopIteration, LoopSpec, RangeBound, RangeSpec, StepOverrides, WorkflowStep};
use super::error::CompileError;
use crate::domain::expression::{self, interpolate, Scalar, StackedScope, VariableScope};

/// Default cap on emitted steps per compilation
pub const DEFAULT_MAX_STEPS: usize = 2000;

/// A concrete step produced by expansion
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedStep {
    pub step: WorkflowStep,
    /// Loop variables bound for this emission
    pub bindings: BTreeMap<String, Value>,
    /// Variables substituted through `{var}` placeholders
    pub referenced: BTreeSet<String>,
    /// Index of the template step this came from
    pub origin: usize,
}

impl ExpandedStep {
    /// Wrap a step without expanding it
    pub fn unexpanded(step: WorkflowStep, origin: usize) -> Self {
        Self {
            step,
            bindings: BTreeMap::new(),
            referenced: BTreeSet::new(),
            origin,
        }
    }
}

#[derive(Debug, Clone)]
enum Axis {
    Range { start: i64, len: usize },
    Values(Vec<Value>),
}

impl Axis {
    fn len(&self) -> usize {
        match self {
            Self::Range { len, .. } => *len,
            Self::Values(values) => values.len(),
        }
    }

    fn get(&self, k: usize) -> Value {
        match self {
            Self::Range { start, .. } => Value::from(start + k as i64),
            Self::Values(values) => values[k].clone(),
        }
    }
}

/// Iteration space of one template step
#[derive(Debug, Clone)]
struct IterationPlan {
    variables: Vec<String>,
    axes: Vec<Axis>,
}

impl IterationPlan {
    fn unit() -> Self {
        Self {
            variables: Vec::new(),
            axes: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        self.axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
            .unwrap_or(usize::MAX)
    }

    /// Bindings of iteration `k`; the first variable varies slowest
    fn bindings(&self, mut k: usize) -> BTreeMap<String, Value> {
        let mut digits = vec![0usize; self.axes.len()];
        for (slot, axis) in self.axes.iter().enumerate().rev() {
            let len = axis.len().max(1);
            digits[slot] = k % len;
            k /= len;
        }

        self.variables
            .iter()
            .zip(self.axes.iter().zip(digits))
            .map(|(name, (axis, digit))| (name.clone(), axis.get(digit)))
            .collect()
    }
}

/// Expands loop-annotated steps into concrete steps
#[derive(Debug, Clone)]
pub struct LoopExpander {
    max_steps: usize,
}

impl Default for LoopExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl LoopExpander {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Expand `steps` against `context`.
    ///
    /// Adjacent steps whose loops share a group are emitted interleaved:
    /// iteration 1 of each, then iteration 2 of each, and so on.
    pub fn expand(
        &self,
        steps: &[WorkflowStep],
        context: &dyn VariableScope,
    ) -> Result<Vec<ExpandedStep>, CompileError> {
        let mut expanded = Vec::new();
        let mut start = 0;

        while start < steps.len() {
            let group = loop_group(&steps[start]);
            let mut end = start + 1;
            if let Some(group) = group {
                while end < steps.len() && loop_group(&steps[end]) == Some(group) {
                    end += 1;
                }
            }

            let plans = steps[start..end]
                .iter()
                .map(|step| plan(step, context).map_err(|e| e.in_step(step.label())))
                .collect::<Result<Vec<_>, _>>()?;

            let counts: Vec<usize> = plans.iter().map(IterationPlan::count).collect();
            if let Some(group) = group {
                check_group(group, &steps[start..end], &counts)?;
            }

            let attempted = counts
                .iter()
                .fold(expanded.len(), |acc, c| acc.saturating_add(*c));
            if attempted > self.max_steps {
                return Err(CompileError::step_limit_exceeded(self.max_steps, attempted));
            }

            let iterations = counts.first().copied().unwrap_or(0);
            if group.is_some() {
                for k in 0..iterations {
                    for (offset, plan) in plans.iter().enumerate() {
                        let origin = start + offset;
                        expanded.push(instantiate(&steps[origin], origin, plan.bindings(k), context)?);
                    }
                }
            } else {
                for k in 0..iterations {
                    expanded.push(instantiate(&steps[start], start, plans[0].bindings(k), context)?);
                }
            }

            start = end;
        }

        debug!(templates = steps.len(), emitted = expanded.len(), "Expanded steps");
        Ok(expanded)
    }
}

fn loop_group(step: &WorkflowStep) -> Option<&str> {
    step.loop_spec.as_ref().and_then(|l| l.group.as_deref())
}

fn check_group(group: &str, steps: &[WorkflowStep], counts: &[usize]) -> Result<(), CompileError> {
    let expected = counts.first().copied().unwrap_or(0);
    for (step, &found) in steps.iter().zip(counts) {
        if found != expected {
            return Err(CompileError::LoopGroupMismatch {
                group: group.to_string(),
                step: step.label().to_string(),
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn plan(step: &WorkflowStep, context: &dyn VariableScope) -> Result<IterationPlan, CompileError> {
    let Some(LoopSpec { iteration, .. }) = &step.loop_spec else {
        return Ok(IterationPlan::unit());
    };

    match iteration {
        LoopIteration::Range { variable, range } => Ok(IterationPlan {
            variables: vec![variable.clone()],
            axes: vec![range_axis(step, range, context)?],
        }),
        LoopIteration::Values { variable, values } => Ok(IterationPlan {
            variables: vec![variable.clone()],
            axes: vec![Axis::Values(values.clone())],
        }),
        LoopIteration::Product { variables, ranges } => {
            if variables.is_empty() || variables.len() != ranges.len() {
                return Err(CompileError::invalid_loop(
                    step.label(),
                    format!("{} variables but {} ranges", variables.len(), ranges.len()),
                ));
            }
            let axes = ranges
                .iter()
                .map(|range| range_axis(step, range, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(IterationPlan {
                variables: variables.clone(),
                axes,
            })
        }
    }
}

fn range_axis(
    step: &WorkflowStep,
    range: &RangeSpec,
    context: &dyn VariableScope,
) -> Result<Axis, CompileError> {
    let start = resolve_bound(step, &range.start, context)?;
    let end = resolve_bound(step, &range.end, context)?;

    let len = if end < start {
        0
    } else {
        usize::try_from(end.abs_diff(start)).map_or(usize::MAX, |d| d.saturating_add(1))
    };
    Ok(Axis::Range { start, len })
}

fn resolve_bound(
    step: &WorkflowStep,
    bound: &RangeBound,
    context: &dyn VariableScope,
) -> Result<i64, CompileError> {
    let source = match bound {
        RangeBound::Literal(v) => return Ok(*v),
        RangeBound::Expression(source) => source,
    };

    let text = interpolate(source, context)?.text;
    match expression::evaluate(&text, context)? {
        Scalar::Int(v) => Ok(v),
        Scalar::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        other => Err(CompileError::invalid_loop(
            step.label(),
            format!("range bound '{}' evaluated to non-integer {}", source, other),
        )),
    }
}

/// Build one concrete step from a template and its iteration bindings
fn instantiate(
    template: &WorkflowStep,
    origin: usize,
    bindings: BTreeMap<String, Value>,
    context: &dyn VariableScope,
) -> Result<ExpandedStep, CompileError> {
    let scope = StackedScope::new(&bindings, context);
    let mut referenced = BTreeSet::new();

    let result = (|| -> Result<WorkflowStep, CompileError> {
        let id = interpolate_opt(template.id.as_deref(), &scope, &mut referenced)?;
        let description = interpolate_opt(template.description.as_deref(), &scope, &mut referenced)?;
        let condition = interpolate_opt(template.condition.as_deref(), &scope, &mut referenced)?;
        let depends_on = template
            .depends_on
            .iter()
            .map(|d| interpolate_text(d, &scope, &mut referenced))
            .collect::<Result<Vec<_>, _>>()?;
        let params = interpolate_map(&template.params, &scope, &mut referenced)?;

        Ok(template.clone_with(StepOverrides {
            id: Some(id),
            params: Some(params),
            description: Some(description),
            condition: Some(condition),
            depends_on: Some(depends_on),
            drop_loop: true,
        }))
    })();

    let step = result.map_err(|e| e.in_step(template.label()))?;
    Ok(ExpandedStep {
        step,
        bindings,
        referenced,
        origin,
    })
}

fn interpolate_text(
    text: &str,
    scope: &dyn VariableScope,
    referenced: &mut BTreeSet<String>,
) -> Result<String, CompileError> {
    let result = interpolate(text, scope)?;
    referenced.extend(result.referenced);
    Ok(result.text)
}

fn interpolate_opt(
    text: Option<&str>,
    scope: &dyn VariableScope,
    referenced: &mut BTreeSet<String>,
) -> Result<Option<String>, CompileError> {
    text.map(|t| interpolate_text(t, scope, referenced)).transpose()
}

fn interpolate_map(
    map: &Map<String, Value>,
    scope: &dyn VariableScope,
    referenced: &mut BTreeSet<String>,
) -> Result<Map<String, Value>, CompileError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), interpolate_value(value, scope, referenced)?)))
        .collect()
}

fn interpolate_value(
    value: &Value,
    scope: &dyn VariableScope,
    referenced: &mut BTreeSet<String>,
) -> Result<Value, CompileError> {
    match value {
        Value::String(s) => Ok(Value::String(interpolate_text(s, scope, referenced)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate_value(item, scope, referenced))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => interpolate_map(map, scope, referenced).map(Value::Object),
        other => Ok(other.clone()),
    }
}
