//! Group binding of parameter values

use crate::domain::workflow::{ParameterSchema, WorkflowDefinition};

use super::analysis::tokenize;

/// Words that single out one member of a parameter group
pub const SIDE_QUALIFIERS: &[&str] = &[
    "left", "right", "front", "back", "rear", "top", "bottom", "inner", "outer", "upper", "lower",
];

/// Side qualifiers present in `text`
pub fn side_qualifiers(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| SIDE_QUALIFIERS.contains(&w.as_str()))
        .collect()
}

/// Parameters a value for `parameter` applies to, given the text it came from.
///
/// Ungrouped parameters bind alone. For a grouped parameter, text without a
/// side qualifier binds every member of the group; a side-qualified text
/// binds only the members whose name carries that qualifier.
pub fn bind_targets<'a>(
    definition: &'a WorkflowDefinition,
    parameter: &str,
    context: &str,
) -> Vec<&'a ParameterSchema> {
    let Some(schema) = definition.parameter(parameter) else {
        return Vec::new();
    };
    let Some(group) = schema.group.as_deref() else {
        return vec![schema];
    };

    let members = definition.group_members(group);
    let qualifiers = side_qualifiers(context);
    if qualifiers.is_empty() {
        return members;
    }

    let qualified: Vec<&ParameterSchema> = members
        .into_iter()
        .filter(|member| {
            member
                .name
                .split('_')
                .any(|token| qualifiers.iter().any(|q| q == token))
        })
        .collect();

    if qualified.is_empty() {
        vec![schema]
    } else {
        qualified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::ParameterType;
    use serde_json::json;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("picnic_table")
            .with_parameter(
                ParameterSchema::new("leg_angle_left", ParameterType::Float, json!(0.32))
                    .with_group("leg_angles"),
            )
            .with_parameter(
                ParameterSchema::new("leg_angle_right", ParameterType::Float, json!(-0.32))
                    .with_group("leg_angles"),
            )
            .with_parameter(ParameterSchema::new("width", ParameterType::Float, json!(1.0)))
    }

    fn names(targets: Vec<&ParameterSchema>) -> Vec<&str> {
        targets.into_iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_plural_binds_whole_group() {
        let definition = definition();
        assert_eq!(
            names(bind_targets(&definition, "leg_angle_left", "vertical legs")),
            vec!["leg_angle_left", "leg_angle_right"]
        );
    }

    #[test]
    fn test_side_qualified_binds_one_member() {
        let definition = definition();
        assert_eq!(
            names(bind_targets(&definition, "leg_angle_left", "the right leg leans out")),
            vec!["leg_angle_right"]
        );
    }

    #[test]
    fn test_ungrouped_binds_alone() {
        let definition = definition();
        assert_eq!(names(bind_targets(&definition, "width", "left side")), vec!["width"]);
        assert!(bind_targets(&definition, "unknown", "").is_empty());
    }

    #[test]
    fn test_side_qualifiers() {
        assert_eq!(side_qualifiers("Upper LEFT corner"), vec!["upper", "left"]);
        assert!(side_qualifiers("both legs").is_empty());
    }
}
