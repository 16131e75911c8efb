//! Sandboxed expression language
//!
//! Two surface forms share one grammar:
//! - value expressions, written as `$CALCULATE(expr)` inside step parameters
//! - guard expressions, written as a step's `condition`
//!
//! The language is total: no loops, no user functions, no I/O, and trees
//! deeper than [`MAX_NESTING_DEPTH`] are rejected at parse time. Identifiers
//! resolve only against the supplied [`VariableScope`]; calls resolve only
//! against the closed [`functions::WHITELIST`].

mod ast;
mod error;
mod evaluator;
pub mod functions;
mod interpolate;
mod lexer;
mod parser;
mod value;

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub use ast::{BinaryOp, CompareOp, Expr, UnaryOp};
pub use error::ExpressionError;
pub use evaluator::{StackedScope, VariableScope};
pub use parser::MAX_NESTING_DEPTH;
pub use interpolate::{has_placeholders, interpolate, value_to_text, Interpolated, InterpolationError};
pub use value::Scalar;

/// `$CALCULATE(expr)` spanning the whole string
static CALCULATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\$CALCULATE\((?s)(.*)\)\s*$").unwrap());

/// `$name` spanning the whole string
static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap());

/// A parsed expression that can be evaluated many times
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    ast: Expr,
}

impl CompiledExpression {
    /// Parse an expression once
    pub fn parse(source: impl Into<String>) -> Result<Self, ExpressionError> {
        let source = source.into();
        let ast = parser::parse(&source)?;
        Ok(Self { source, ast })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Variable names this expression reads
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.ast.identifiers()
    }

    /// Evaluate to a scalar value
    pub fn evaluate(&self, scope: &dyn VariableScope) -> Result<Scalar, ExpressionError> {
        evaluator::eval(&self.ast, scope).map_err(|e| e.in_expression(&self.source))
    }

    /// Evaluate as a guard; the result must be a boolean
    pub fn evaluate_condition(&self, scope: &dyn VariableScope) -> Result<bool, ExpressionError> {
        match self.evaluate(scope)? {
            Scalar::Bool(b) => Ok(b),
            other => Err(ExpressionError::type_error(
                format!("condition must be boolean, got {}", other.type_name()),
                self.source.clone(),
            )),
        }
    }
}

/// Parse and evaluate a value expression in one go
pub fn evaluate(source: &str, scope: &dyn VariableScope) -> Result<Scalar, ExpressionError> {
    CompiledExpression::parse(source)?.evaluate(scope)
}

/// Parse and evaluate a guard expression in one go
pub fn evaluate_condition(source: &str, scope: &dyn VariableScope) -> Result<bool, ExpressionError> {
    CompiledExpression::parse(source)?.evaluate_condition(scope)
}

/// Inner text of a `$CALCULATE(...)` parameter value
pub fn calculate_body(value: &str) -> Option<&str> {
    CALCULATE_PATTERN
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Variable name of a `$name` parameter value
pub fn reference_name(value: &str) -> Option<&str> {
    if calculate_body(value).is_some() {
        return None;
    }
    REFERENCE_PATTERN
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[test]
    fn test_atan2_value() {
        let scope: HashMap<String, Value> = HashMap::new();
        let Scalar::Float(value) = evaluate("atan2(4, 2)", &scope).unwrap() else {
            panic!("expected float");
        };
        assert!((value - 1.1071).abs() < 1e-4);
    }

    #[test]
    fn test_errors_carry_expression_text() {
        let scope: HashMap<String, Value> = HashMap::new();
        let err = evaluate("width * 2", &scope).unwrap_err();
        assert_eq!(err, ExpressionError::unknown_symbol("width", "width * 2"));
    }

    #[test]
    fn test_condition_must_be_boolean() {
        let scope = HashMap::from([("leg_count".to_string(), json!(4))]);
        assert!(evaluate_condition("leg_count >= 4", &scope).unwrap());
        let err = evaluate_condition("leg_count", &scope).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }

    #[test]
    fn test_compiled_expression_reuse() {
        let expr = CompiledExpression::parse("i * spacing").unwrap();
        let names: Vec<String> = expr.identifiers().into_iter().collect();
        assert_eq!(names, vec!["i".to_string(), "spacing".to_string()]);

        for i in 0..3 {
            let scope = HashMap::from([
                ("i".to_string(), json!(i)),
                ("spacing".to_string(), json!(2)),
            ]);
            assert_eq!(expr.evaluate(&scope).unwrap(), Scalar::Int(i * 2));
        }
    }

    #[test]
    fn test_calculate_body() {
        assert_eq!(calculate_body("$CALCULATE(width / 2)"), Some("width / 2"));
        assert_eq!(calculate_body("  $CALCULATE(max(a, (b)))  "), Some("max(a, (b))"));
        assert_eq!(calculate_body("width / 2"), None);
        assert_eq!(calculate_body("prefix $CALCULATE(1)"), None);
    }

    #[test]
    fn test_reference_name() {
        assert_eq!(reference_name("$table_width"), Some("table_width"));
        assert_eq!(reference_name("$CALCULATE(1)"), None);
        assert_eq!(reference_name("$not a ref"), None);
        assert_eq!(reference_name("table_width"), None);
    }
}
