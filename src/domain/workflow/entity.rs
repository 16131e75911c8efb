//! Workflow definition entities

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::CompileError;

/// Declared value type of a parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    Float,
    Int,
    Bool,
    String,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::String => "string",
        };
        write!(f, "{}", name)
    }
}

/// Schema of one workflow parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSchema {
    pub name: String,

    #[serde(rename = "type", default)]
    pub param_type: ParameterType,

    /// Inclusive `[min, max]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    #[serde(default)]
    pub default: Value,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantic_hints: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Expression computing this parameter from others
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: ParameterType, default: Value) -> Self {
        Self {
            name: name.into(),
            param_type,
            range: None,
            allowed: None,
            default,
            description: String::new(),
            semantic_hints: Vec::new(),
            group: None,
            computed: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_enum(mut self, allowed: Vec<Value>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_hints(mut self, hints: &[&str]) -> Self {
        self.semantic_hints = hints.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_computed(mut self, expression: impl Into<String>, depends_on: &[&str]) -> Self {
        self.computed = Some(expression.into());
        self.depends_on = depends_on.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Check a candidate value against type, range and enum; returns the normalized value
    pub fn validate(&self, value: &Value) -> Result<Value, CompileError> {
        let normalized = self.coerce(value)?;

        if let (Some((min, max)), Some(number)) = (self.range, normalized.as_f64()) {
            if number < min || number > max {
                return Err(CompileError::ParameterOutOfRange {
                    parameter: self.name.clone(),
                    value: normalized.to_string(),
                    min,
                    max,
                });
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|candidate| values_equal(candidate, &normalized)) {
                return Err(CompileError::ParameterEnumViolation {
                    parameter: self.name.clone(),
                    value: normalized.to_string(),
                    allowed: allowed.iter().map(|v| v.to_string()).collect(),
                });
            }
        }

        Ok(normalized)
    }

    fn coerce(&self, value: &Value) -> Result<Value, CompileError> {
        let mismatch = || {
            CompileError::parameter_type(&self.name, self.param_type.to_string(), describe(value))
        };

        match self.param_type {
            ParameterType::Float => match value {
                Value::Number(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            ParameterType::Int => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            ParameterType::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            ParameterType::String => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "float".to_string(),
        Value::Number(_) => "int".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// Explicit phrase → parameter values rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Modifier {
    pub phrase: String,

    #[serde(default)]
    pub values: BTreeMap<String, Value>,

    /// Tokens whose presence in the goal vetoes this modifier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub negative_signals: Vec<String>,
}

impl Modifier {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            values: BTreeMap::new(),
            negative_signals: Vec::new(),
        }
    }

    pub fn with_value(mut self, parameter: impl Into<String>, value: Value) -> Self {
        self.values.insert(parameter.into(), value);
        self
    }

    pub fn with_negative_signals(mut self, signals: &[&str]) -> Self {
        self.negative_signals = signals.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// What to do when the actuator reports a step failure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    #[default]
    Stop,
    Skip,
    Continue,
}

/// One bound of an inclusive integer range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeBound {
    Literal(i64),
    Expression(String),
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{}", v),
            Self::Expression(e) => write!(f, "{}", e),
        }
    }
}

/// Inclusive range `start..end`; bounds may be expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct RangeSpec {
    pub start: RangeBound,
    pub end: RangeBound,
}

impl RangeSpec {
    pub fn literal(start: i64, end: i64) -> Self {
        Self {
            start: RangeBound::Literal(start),
            end: RangeBound::Literal(end),
        }
    }

    /// Parse `"a..b"`
    pub fn parse(text: &str) -> Result<Self, String> {
        let Some((start, end)) = text.split_once("..") else {
            return Err(format!("range '{}' must look like 'start..end'", text));
        };
        Ok(Self {
            start: parse_bound(start, text)?,
            end: parse_bound(end, text)?,
        })
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn parse_bound(text: &str, whole: &str) -> Result<RangeBound, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(format!("range '{}' has an empty bound", whole));
    }
    Ok(match trimmed.parse::<i64>() {
        Ok(v) => RangeBound::Literal(v),
        Err(_) => RangeBound::Expression(trimmed.to_string()),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawBound {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRange {
    Text(String),
    Pair(RawBound, RawBound),
}

impl TryFrom<RawRange> for RangeSpec {
    type Error = String;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        match raw {
            RawRange::Text(text) => Self::parse(&text),
            RawRange::Pair(start, end) => {
                let convert = |bound: RawBound| match bound {
                    RawBound::Int(v) => Ok(RangeBound::Literal(v)),
                    RawBound::Text(t) => parse_bound(&t, &t),
                };
                Ok(Self {
                    start: convert(start)?,
                    end: convert(end)?,
                })
            }
        }
    }
}

impl From<RangeSpec> for RawRange {
    fn from(range: RangeSpec) -> Self {
        RawRange::Text(range.to_string())
    }
}

/// Iteration space declared by a loop
#[derive(Debug, Clone, PartialEq)]
pub enum LoopIteration {
    Range { variable: String, range: RangeSpec },
    Values { variable: String, values: Vec<Value> },
    /// Cartesian product; the first variable is the outer loop
    Product {
        variables: Vec<String>,
        ranges: Vec<RangeSpec>,
    },
}

/// Loop annotation on a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLoopSpec", into = "RawLoopSpec")]
pub struct LoopSpec {
    pub iteration: LoopIteration,
    /// Adjacent steps sharing a group expand interleaved per iteration
    pub group: Option<String>,
}

impl LoopSpec {
    pub fn range(variable: impl Into<String>, range: RangeSpec) -> Self {
        Self {
            iteration: LoopIteration::Range {
                variable: variable.into(),
                range,
            },
            group: None,
        }
    }

    pub fn values(variable: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            iteration: LoopIteration::Values {
                variable: variable.into(),
                values,
            },
            group: None,
        }
    }

    pub fn product(variables: &[&str], ranges: Vec<RangeSpec>) -> Self {
        Self {
            iteration: LoopIteration::Product {
                variables: variables.iter().map(|v| v.to_string()).collect(),
                ranges,
            },
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Loop variable names in declaration order
    pub fn variables(&self) -> Vec<&str> {
        match &self.iteration {
            LoopIteration::Range { variable, .. } | LoopIteration::Values { variable, .. } => {
                vec![variable.as_str()]
            }
            LoopIteration::Product { variables, .. } => {
                variables.iter().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawLoopSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<RangeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ranges: Option<Vec<RangeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
}

impl TryFrom<RawLoopSpec> for LoopSpec {
    type Error = String;

    fn try_from(raw: RawLoopSpec) -> Result<Self, Self::Error> {
        let iteration = match (raw.variable, raw.range, raw.values, raw.variables, raw.ranges) {
            (Some(variable), Some(range), None, None, None) => {
                LoopIteration::Range { variable, range }
            }
            (Some(variable), None, Some(values), None, None) => {
                LoopIteration::Values { variable, values }
            }
            (None, None, None, Some(variables), Some(ranges)) => {
                if variables.is_empty() || variables.len() != ranges.len() {
                    return Err(format!(
                        "loop declares {} variables but {} ranges",
                        variables.len(),
                        ranges.len()
                    ));
                }
                LoopIteration::Product { variables, ranges }
            }
            _ => {
                return Err(
                    "loop needs either 'variable' with 'range' or 'values', or 'variables' with 'ranges'"
                        .to_string(),
                );
            }
        };

        Ok(Self {
            iteration,
            group: raw.group,
        })
    }
}

impl From<LoopSpec> for RawLoopSpec {
    fn from(spec: LoopSpec) -> Self {
        let mut raw = RawLoopSpec {
            group: spec.group,
            ..Default::default()
        };
        match spec.iteration {
            LoopIteration::Range { variable, range } => {
                raw.variable = Some(variable);
                raw.range = Some(range);
            }
            LoopIteration::Values { variable, values } => {
                raw.variable = Some(variable);
                raw.values = Some(values);
            }
            LoopIteration::Product { variables, ranges } => {
                raw.variables = Some(variables);
                raw.ranges = Some(ranges);
            }
        }
        raw
    }
}

/// One step template
///
/// Fields the model does not know about are kept in `extensions` and travel
/// with every copy made through [`WorkflowStep::clone_with`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub tool: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default)]
    pub optional: bool,

    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<f64>,

    #[serde(default)]
    pub on_failure: OnFailure,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Replacement values for the text-bearing fields of a step
#[derive(Debug, Clone, Default)]
pub struct StepOverrides {
    pub id: Option<Option<String>>,
    pub params: Option<Map<String, Value>>,
    pub description: Option<Option<String>>,
    pub condition: Option<Option<String>>,
    pub depends_on: Option<Vec<String>>,
    pub drop_loop: bool,
}

impl WorkflowStep {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            id: None,
            tool: tool.into(),
            params: Map::new(),
            description: None,
            condition: None,
            optional: false,
            loop_spec: None,
            depends_on: Vec::new(),
            timeout: None,
            max_retries: None,
            retry_delay: None,
            on_failure: OnFailure::default(),
            priority: None,
            extensions: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_loop(mut self, loop_spec: LoopSpec) -> Self {
        self.loop_spec = Some(loop_spec);
        self
    }

    pub fn with_depends_on(mut self, depends_on: &[&str]) -> Self {
        self.depends_on = depends_on.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// The only way steps are copied during compilation: every field not
    /// overridden, extensions included, is carried over.
    pub fn clone_with(&self, overrides: StepOverrides) -> Self {
        let mut step = self.clone();
        if let Some(id) = overrides.id {
            step.id = id;
        }
        if let Some(params) = overrides.params {
            step.params = params;
        }
        if let Some(description) = overrides.description {
            step.description = description;
        }
        if let Some(condition) = overrides.condition {
            step.condition = condition;
        }
        if let Some(depends_on) = overrides.depends_on {
            step.depends_on = depends_on;
        }
        if overrides.drop_loop {
            step.loop_spec = None;
        }
        step
    }

    /// Label used in errors and logs
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.tool)
    }
}

/// A named, parameterized workflow template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Phrases that select this workflow directly when found in a goal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_keywords: Vec<String>,

    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, Value>,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            trigger_keywords: Vec::new(),
            parameters: Vec::new(),
            modifiers: Vec::new(),
            defaults: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_trigger_keywords(mut self, keywords: &[&str]) -> Self {
        self.trigger_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(name.into(), value);
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Members of a parameter group in declaration order
    pub fn group_members(&self, group: &str) -> Vec<&ParameterSchema> {
        self.parameters
            .iter()
            .filter(|p| p.group.as_deref() == Some(group))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_validate_range() {
        let schema = ParameterSchema::new("leg_angle", ParameterType::Float, json!(0.0))
            .with_range(-1.57, 1.57);

        assert_eq!(schema.validate(&json!(0.5)).unwrap(), json!(0.5));

        let err = schema.validate(&json!(2.0)).unwrap_err();
        assert!(matches!(err, CompileError::ParameterOutOfRange { ref parameter, .. } if parameter == "leg_angle"));
    }

    #[test]
    fn test_parameter_validate_enum() {
        let schema = ParameterSchema::new("leg_style", ParameterType::String, json!("straight"))
            .with_enum(vec![json!("straight"), json!("angled")]);

        assert!(schema.validate(&json!("angled")).is_ok());
        let err = schema.validate(&json!("curved")).unwrap_err();
        assert!(matches!(err, CompileError::ParameterEnumViolation { .. }));
    }

    #[test]
    fn test_parameter_validate_int_coercion() {
        let schema = ParameterSchema::new("leg_count", ParameterType::Int, json!(4));

        assert_eq!(schema.validate(&json!(6.0)).unwrap(), json!(6));
        assert!(schema.validate(&json!(6.5)).is_err());
        assert!(schema.validate(&json!("6")).is_err());
    }

    #[test]
    fn test_parameter_validate_type_mismatch() {
        let schema = ParameterSchema::new("has_bench", ParameterType::Bool, json!(false));
        let err = schema.validate(&json!(1)).unwrap_err();
        assert_eq!(err, CompileError::parameter_type("has_bench", "bool", "int"));
    }

    #[test]
    fn test_range_spec_parse() {
        assert_eq!(RangeSpec::parse("1..4").unwrap(), RangeSpec::literal(1, 4));

        let range = RangeSpec::parse("0..leg_count - 1").unwrap();
        assert_eq!(range.start, RangeBound::Literal(0));
        assert_eq!(range.end, RangeBound::Expression("leg_count - 1".into()));

        assert!(RangeSpec::parse("1-4").is_err());
        assert!(RangeSpec::parse("..4").is_err());
    }

    #[test]
    fn test_loop_spec_deserialize_forms() {
        let single: LoopSpec =
            serde_json::from_value(json!({"variable": "i", "range": "1..3", "group": "legs"}))
                .unwrap();
        assert_eq!(single.variables(), vec!["i"]);
        assert_eq!(single.group.as_deref(), Some("legs"));

        let pair: LoopSpec =
            serde_json::from_value(json!({"variable": "i", "range": [1, "n"]})).unwrap();
        assert!(matches!(
            pair.iteration,
            LoopIteration::Range { ref range, .. } if range.end == RangeBound::Expression("n".into())
        ));

        let values: LoopSpec =
            serde_json::from_value(json!({"variable": "side", "values": ["left", "right"]}))
                .unwrap();
        assert!(matches!(values.iteration, LoopIteration::Values { .. }));

        let product: LoopSpec = serde_json::from_value(
            json!({"variables": ["row", "col"], "ranges": ["1..2", "1..3"]}),
        )
        .unwrap();
        assert_eq!(product.variables(), vec!["row", "col"]);
    }

    #[test]
    fn test_loop_spec_rejects_ambiguous_forms() {
        let result: Result<LoopSpec, _> =
            serde_json::from_value(json!({"variable": "i", "range": "1..3", "values": [1]}));
        assert!(result.is_err());

        let result: Result<LoopSpec, _> =
            serde_json::from_value(json!({"variables": ["a", "b"], "ranges": ["1..2"]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_step_keeps_unknown_fields() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "id": "top",
            "tool": "modeling_create_primitive",
            "params": {"primitive_type": "CUBE"},
            "disable_adaptation": true,
            "tags": ["core"]
        }))
        .unwrap();

        assert_eq!(step.extensions.get("disable_adaptation"), Some(&json!(true)));
        assert_eq!(step.extensions.get("tags"), Some(&json!(["core"])));

        let copy = step.clone_with(StepOverrides {
            id: Some(Some("top_copy".into())),
            ..Default::default()
        });
        assert_eq!(copy.id.as_deref(), Some("top_copy"));
        assert_eq!(copy.extensions, step.extensions);
        assert_eq!(copy.params, step.params);
    }

    #[test]
    fn test_clone_with_drops_loop_only_when_asked() {
        let step = WorkflowStep::new("mesh_extrude")
            .with_loop(LoopSpec::range("i", RangeSpec::literal(1, 2)))
            .with_extension("x_meta", json!(1));

        assert!(step.clone_with(StepOverrides::default()).loop_spec.is_some());

        let expanded = step.clone_with(StepOverrides {
            drop_loop: true,
            ..Default::default()
        });
        assert!(expanded.loop_spec.is_none());
        assert_eq!(expanded.extensions.get("x_meta"), Some(&json!(1)));
    }

    #[test]
    fn test_definition_deserialize() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "name": "picnic_table",
            "description": "Picnic table with legs",
            "parameters": [
                {"name": "leg_angle", "type": "float", "range": [-1.57, 1.57], "default": 0.32,
                 "semantic_hints": ["angle", "splay"], "group": "legs"}
            ],
            "modifiers": [
                {"phrase": "straight legs", "values": {"leg_angle": 0.0}, "negative_signals": ["angled"]}
            ],
            "steps": [{"tool": "modeling_create_primitive"}]
        }))
        .unwrap();

        assert_eq!(definition.parameters[0].range, Some((-1.57, 1.57)));
        assert_eq!(definition.modifiers[0].negative_signals, vec!["angled"]);
        assert_eq!(definition.group_members("legs").len(), 1);
        assert!(definition.parameter("leg_angle").is_some());
    }
}
