//! Per-request evaluation context
//!
//! Bindings are layered in a fixed order: defaults, explicit overrides,
//! computed parameters, then resolver output. A binding made by an explicit
//! override is never replaced by a later layer. Loop variables are not stored
//! here; they are stacked on top for one emitted step at a time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::expression::VariableScope;

/// Where a bound value came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Explicit,
    Default,
    Computed,
    Modifier,
    Learned,
    Clarified,
    Loop,
}

impl ParameterSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Default => "default",
            Self::Computed => "computed",
            Self::Modifier => "modifier",
            Self::Learned => "learned",
            Self::Clarified => "clarified",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Binding {
    value: Value,
    source: ParameterSource,
}

/// Variable bindings for one compilation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    bindings: BTreeMap<String, Binding>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value; returns false when an explicit override already holds the name
    pub fn bind(&mut self, name: impl Into<String>, value: Value, source: ParameterSource) -> bool {
        let name = name.into();
        if self.is_explicit(&name) && source != ParameterSource::Explicit {
            return false;
        }
        self.bindings.insert(name, Binding { value, source });
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(|b| &b.value)
    }

    pub fn source(&self, name: &str) -> Option<ParameterSource> {
        self.bindings.get(name).map(|b| b.source)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn is_explicit(&self, name: &str) -> bool {
        self.source(name) == Some(ParameterSource::Explicit)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Plain name → value view
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value.clone()))
            .collect()
    }

    pub fn sources(&self) -> BTreeMap<String, ParameterSource> {
        self.bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.source))
            .collect()
    }
}

impl VariableScope for EvaluationContext {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_later_layers_shadow_defaults() {
        let mut ctx = EvaluationContext::new();
        ctx.bind("leg_angle", json!(0.32), ParameterSource::Default);
        ctx.bind("leg_angle", json!(0.0), ParameterSource::Modifier);

        assert_eq!(ctx.get("leg_angle"), Some(&json!(0.0)));
        assert_eq!(ctx.source("leg_angle"), Some(ParameterSource::Modifier));
    }

    #[test]
    fn test_explicit_override_wins() {
        let mut ctx = EvaluationContext::new();
        ctx.bind("width", json!(1.0), ParameterSource::Default);
        ctx.bind("width", json!(2.0), ParameterSource::Explicit);

        assert!(!ctx.bind("width", json!(3.0), ParameterSource::Computed));
        assert_eq!(ctx.get("width"), Some(&json!(2.0)));
        assert!(ctx.is_explicit("width"));
    }

    #[test]
    fn test_scope_lookup() {
        let mut ctx = EvaluationContext::new();
        ctx.bind("leg_count", json!(4), ParameterSource::Default);

        assert_eq!(ctx.lookup("leg_count"), Some(&json!(4)));
        assert_eq!(ctx.lookup("missing"), None);
        assert_eq!(ctx.values().len(), 1);
    }

    #[test]
    fn test_source_serialization() {
        assert_eq!(
            serde_json::to_value(ParameterSource::Clarified).unwrap(),
            json!("clarified")
        );
        assert_eq!(ParameterSource::Loop.to_string(), "loop");
    }
}
