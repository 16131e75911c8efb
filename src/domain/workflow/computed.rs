//! Computed parameters

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::context::{EvaluationContext, ParameterSource};
use super::entity::{ParameterSchema, WorkflowDefinition};
use super::error::{CompileError, DependencyKind};
use super::ordering::find_cycle;
use crate::domain::expression::CompiledExpression;

/// A computed parameter with its parsed expression
#[derive(Debug, Clone)]
pub struct ComputedParameter<'a> {
    pub schema: &'a ParameterSchema,
    pub expression: CompiledExpression,
}

/// Computed parameters of `definition` in dependency order.
///
/// Edges come from `depends_on` plus any computed parameter the expression
/// itself reads. Ties keep declaration order.
pub fn computed_order(
    definition: &WorkflowDefinition,
) -> Result<Vec<ComputedParameter<'_>>, CompileError> {
    let mut computed = Vec::new();
    for schema in &definition.parameters {
        if let Some(source) = &schema.computed {
            let expression = CompiledExpression::parse(source.as_str())?;
            computed.push(ComputedParameter { schema, expression });
        }
    }

    let index: HashMap<&str, usize> = computed
        .iter()
        .enumerate()
        .map(|(i, c)| (c.schema.name.as_str(), i))
        .collect();

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); computed.len()];
    let mut in_degree = vec![0usize; computed.len()];

    for (i, parameter) in computed.iter().enumerate() {
        let mut prerequisites: Vec<&str> =
            parameter.schema.depends_on.iter().map(String::as_str).collect();
        let identifiers = parameter.expression.identifiers();
        prerequisites.extend(identifiers.iter().map(String::as_str));
        prerequisites.sort_unstable();
        prerequisites.dedup();

        for name in prerequisites {
            if let Some(&j) = index.get(name) {
                edges[j].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> =
        (0..computed.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(computed.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &next in &edges[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < computed.len() {
        let cycle = find_cycle(&edges)
            .unwrap_or_default()
            .into_iter()
            .map(|i| computed[i].schema.name.clone())
            .collect();
        return Err(CompileError::cyclic_dependency(DependencyKind::Parameters, cycle));
    }

    let mut slots: Vec<Option<ComputedParameter<'_>>> = computed.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Evaluate computed parameters in order and bind them into `context`.
///
/// Explicitly overridden parameters keep their override.
pub fn apply_computed(
    computed: &[ComputedParameter<'_>],
    context: &mut EvaluationContext,
) -> Result<(), CompileError> {
    for parameter in computed {
        let name = &parameter.schema.name;
        if context.is_explicit(name) {
            continue;
        }

        let raw = parameter.expression.evaluate(context)?.to_json();
        let value = parameter.schema.validate(&raw)?;
        debug!(parameter = %name, value = %value, "Computed parameter");
        context.bind(name.clone(), value, ParameterSource::Computed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::entity::ParameterType;
    use serde_json::json;

    fn names(order: &[ComputedParameter<'_>]) -> Vec<String> {
        order.iter().map(|c| c.schema.name.clone()).collect()
    }

    #[test]
    fn test_order_follows_dependencies() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(ParameterSchema::new("width", ParameterType::Float, json!(1.0)))
            .with_parameter(
                ParameterSchema::new("top_area", ParameterType::Float, json!(0.0))
                    .with_computed("half_width * 2 * depth", &["half_width", "depth"]),
            )
            .with_parameter(ParameterSchema::new("depth", ParameterType::Float, json!(0.5)))
            .with_parameter(
                ParameterSchema::new("half_width", ParameterType::Float, json!(0.0))
                    .with_computed("width / 2", &["width"]),
            );

        let order = computed_order(&definition).unwrap();
        assert_eq!(names(&order), vec!["half_width", "top_area"]);
    }

    #[test]
    fn test_undeclared_dependency_is_inferred_from_expression() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(
                ParameterSchema::new("b", ParameterType::Float, json!(0.0)).with_computed("a + 1", &[]),
            )
            .with_parameter(
                ParameterSchema::new("a", ParameterType::Float, json!(0.0)).with_computed("2", &[]),
            );

        assert_eq!(names(&computed_order(&definition).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(
                ParameterSchema::new("a", ParameterType::Float, json!(0.0)).with_computed("b", &["b"]),
            )
            .with_parameter(
                ParameterSchema::new("b", ParameterType::Float, json!(0.0)).with_computed("a", &["a"]),
            );

        let err = computed_order(&definition).unwrap_err();
        assert!(matches!(
            err,
            CompileError::CyclicDependency { kind: DependencyKind::Parameters, .. }
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let definition = WorkflowDefinition::new("table").with_parameter(
            ParameterSchema::new("a", ParameterType::Float, json!(0.0)).with_computed("a + 1", &[]),
        );
        assert!(computed_order(&definition).is_err());
    }

    #[test]
    fn test_apply_computed_respects_explicit() {
        let definition = WorkflowDefinition::new("table")
            .with_parameter(ParameterSchema::new("width", ParameterType::Float, json!(1.0)))
            .with_parameter(
                ParameterSchema::new("half_width", ParameterType::Float, json!(0.0))
                    .with_computed("width / 2", &["width"]),
            )
            .with_parameter(
                ParameterSchema::new("leg_count", ParameterType::Int, json!(4))
                    .with_computed("round(width * 4)", &["width"]),
            );

        let order = computed_order(&definition).unwrap();
        let mut ctx = EvaluationContext::new();
        ctx.bind("width", json!(2.0), ParameterSource::Default);
        ctx.bind("leg_count", json!(6), ParameterSource::Explicit);

        apply_computed(&order, &mut ctx).unwrap();

        assert_eq!(ctx.get("half_width"), Some(&json!(1.0)));
        assert_eq!(ctx.source("half_width"), Some(ParameterSource::Computed));
        assert_eq!(ctx.get("leg_count"), Some(&json!(6)));
    }

    #[test]
    fn test_apply_computed_unknown_symbol() {
        let definition = WorkflowDefinition::new("table").with_parameter(
            ParameterSchema::new("half", ParameterType::Float, json!(0.0)).with_computed("width / 2", &[]),
        );
        let order = computed_order(&definition).unwrap();
        let err = apply_computed(&order, &mut EvaluationContext::new()).unwrap_err();
        assert_eq!(err.code(), "unknown_symbol");
    }
}
