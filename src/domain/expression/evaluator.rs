//! Typed AST evaluator

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::error::ExpressionError;
use super::functions;
use super::value::Scalar;

/// Read-only variable lookup used by the evaluator and interpolation
pub trait VariableScope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl VariableScope for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl VariableScope for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Two scopes stacked: `top` shadows `base`
pub struct StackedScope<'a> {
    top: &'a dyn VariableScope,
    base: &'a dyn VariableScope,
}

impl<'a> StackedScope<'a> {
    pub fn new(top: &'a dyn VariableScope, base: &'a dyn VariableScope) -> Self {
        Self { top, base }
    }
}

impl VariableScope for StackedScope<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.top.lookup(name).or_else(|| self.base.lookup(name))
    }
}

/// Evaluate an AST against a scope
pub fn eval(expr: &Expr, scope: &dyn VariableScope) -> Result<Scalar, ExpressionError> {
    match expr {
        Expr::Int(v) => Ok(Scalar::Int(*v)),
        Expr::Float(v) => Ok(Scalar::Float(*v)),
        Expr::Str(s) => Ok(Scalar::Str(s.clone())),
        Expr::Bool(b) => Ok(Scalar::Bool(*b)),
        Expr::Ident(name) => match scope.lookup(name) {
            Some(value) => Scalar::from_json(name, value),
            None => Err(ExpressionError::unknown_symbol(name, "")),
        },
        Expr::Unary { op, operand } => {
            let value = eval(operand, scope)?;
            eval_unary(*op, value)
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            eval_binary(*op, left, right)
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, scope)?;
            for (op, operand) in rest {
                let right = eval(operand, scope)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Scalar::Bool(false));
                }
                left = right;
            }
            Ok(Scalar::Bool(true))
        }
        Expr::And(left, right) => {
            if !eval(left, scope)?.is_truthy() {
                return Ok(Scalar::Bool(false));
            }
            Ok(Scalar::Bool(eval(right, scope)?.is_truthy()))
        }
        Expr::Or(left, right) => {
            if eval(left, scope)?.is_truthy() {
                return Ok(Scalar::Bool(true));
            }
            Ok(Scalar::Bool(eval(right, scope)?.is_truthy()))
        }
        Expr::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            if eval(condition, scope)?.is_truthy() {
                eval(then_branch, scope)
            } else {
                eval(else_branch, scope)
            }
        }
        Expr::Call { function, args } => {
            if !functions::is_whitelisted(function) {
                return Err(ExpressionError::unknown_function(function, ""));
            }
            let values = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(function, &values)
        }
    }
}

fn eval_unary(op: UnaryOp, value: Scalar) -> Result<Scalar, ExpressionError> {
    match op {
        UnaryOp::Not => Ok(Scalar::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Scalar::Int(i) => i
                .checked_neg()
                .map(Scalar::Int)
                .ok_or_else(|| ExpressionError::arithmetic("integer overflow", "")),
            Scalar::Float(f) => Ok(Scalar::Float(-f)),
            other => Err(ExpressionError::type_error(
                format!("cannot negate {}", other.type_name()),
                "",
            )),
        },
    }
}

fn eval_binary(op: BinaryOp, left: Scalar, right: Scalar) -> Result<Scalar, ExpressionError> {
    if let (BinaryOp::Add, Scalar::Str(a), Scalar::Str(b)) = (op, &left, &right) {
        return Ok(Scalar::Str(format!("{}{}", a, b)));
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(ExpressionError::type_error(
            format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
            "",
        ));
    };

    if let (Scalar::Int(x), Scalar::Int(y)) = (&left, &right) {
        if let Some(result) = integer_binary(op, *x, *y)? {
            return Ok(Scalar::Int(result));
        }
    }

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ExpressionError::arithmetic("division by zero", ""));
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ExpressionError::arithmetic("modulo by zero", ""));
            }
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExpressionError::arithmetic(
                    "zero cannot be raised to a negative power",
                    "",
                ));
            }
            a.powf(b)
        }
    };

    if !result.is_finite() {
        return Err(ExpressionError::arithmetic(
            format!("'{}' produced a non-finite result", op.symbol()),
            "",
        ));
    }

    Ok(Scalar::Float(result))
}

/// Integer fast path; `None` means the operation falls back to floats
fn integer_binary(op: BinaryOp, a: i64, b: i64) -> Result<Option<i64>, ExpressionError> {
    let overflow = || ExpressionError::arithmetic("integer overflow", "");

    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => return Ok(None),
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ExpressionError::arithmetic("modulo by zero", ""));
            }
            a.checked_rem_euclid(b)
                .map(|r| if r != 0 && b < 0 { r + b } else { r })
                .ok_or_else(overflow)?
        }
        BinaryOp::Pow => {
            if b < 0 {
                return Ok(None);
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).ok_or_else(overflow)?
        }
    };

    Ok(Some(result))
}

fn compare(op: CompareOp, left: &Scalar, right: &Scalar) -> Result<bool, ExpressionError> {
    let ordering = match (left, right) {
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match (op, ordering) {
        (CompareOp::Eq, ordering) => Ok(ordering == Some(Ordering::Equal)),
        (CompareOp::Ne, ordering) => Ok(ordering != Some(Ordering::Equal)),
        (_, None) => Err(ExpressionError::type_error(
            format!(
                "cannot compare {} {} {}",
                left.type_name(),
                op.symbol(),
                right.type_name()
            ),
            "",
        )),
        (CompareOp::Lt, Some(o)) => Ok(o == Ordering::Less),
        (CompareOp::Le, Some(o)) => Ok(o != Ordering::Greater),
        (CompareOp::Gt, Some(o)) => Ok(o == Ordering::Greater),
        (CompareOp::Ge, Some(o)) => Ok(o != Ordering::Less),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::parser::parse;
    use serde_json::json;

    fn scope(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(source: &str, vars: &HashMap<String, Value>) -> Result<Scalar, ExpressionError> {
        eval(&parse(source).unwrap(), vars)
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let vars = scope(&[]);
        assert_eq!(run("2 + 3 * 4", &vars).unwrap(), Scalar::Int(14));
        assert_eq!(run("2 ** 10", &vars).unwrap(), Scalar::Int(1024));
        assert_eq!(run("7 % 3", &vars).unwrap(), Scalar::Int(1));
        assert_eq!(run("-7 % 3", &vars).unwrap(), Scalar::Int(2));
    }

    #[test]
    fn test_division_is_float() {
        let vars = scope(&[]);
        assert_eq!(run("7 / 2", &vars).unwrap(), Scalar::Float(3.5));
        assert_eq!(run("2 ** -1", &vars).unwrap(), Scalar::Float(0.5));
    }

    #[test]
    fn test_unary_minus_before_power() {
        let vars = scope(&[]);
        assert_eq!(run("-2 ** 2", &vars).unwrap(), Scalar::Int(4));
        assert_eq!(run("-(2 ** 2)", &vars).unwrap(), Scalar::Int(-4));
    }

    #[test]
    fn test_division_by_zero() {
        let vars = scope(&[("n", json!(0))]);
        let err = run("1 / n", &vars).unwrap_err();
        assert!(matches!(err, ExpressionError::Arithmetic { .. }));
        assert!(run("5 % 0", &vars).is_err());
    }

    #[test]
    fn test_unknown_symbol_is_error_not_falsy() {
        let vars = scope(&[]);
        let err = run("missing > 0", &vars).unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownSymbol { ref name, .. } if name == "missing"));

        // Short-circuit does not hide a bad reference on the evaluated side
        assert!(run("True and missing", &vars).is_err());
    }

    #[test]
    fn test_unknown_function_rejected_before_arguments() {
        let vars = scope(&[]);
        let err = run("system(missing)", &vars).unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownFunction { ref name, .. } if name == "system"));
    }

    #[test]
    fn test_leg_angle_condition() {
        let condition = "(leg_angle > 0.5) or (leg_angle < -0.5)";

        let vars = scope(&[("leg_angle", json!(0.6))]);
        assert_eq!(run(condition, &vars).unwrap(), Scalar::Bool(true));

        let vars = scope(&[("leg_angle", json!(0.0))]);
        assert_eq!(run(condition, &vars).unwrap(), Scalar::Bool(false));
    }

    #[test]
    fn test_ternary_only_evaluates_selected_branch() {
        let vars = scope(&[("x", json!(0))]);
        assert_eq!(run("1 / x if x != 0 else 0", &vars).unwrap(), Scalar::Int(0));
    }

    #[test]
    fn test_chained_comparison() {
        let vars = scope(&[("x", json!(3))]);
        assert_eq!(run("0 < x < 5", &vars).unwrap(), Scalar::Bool(true));
        assert_eq!(run("0 < x < 2", &vars).unwrap(), Scalar::Bool(false));
    }

    #[test]
    fn test_string_comparison() {
        let vars = scope(&[("current_mode", json!("EDIT"))]);
        assert_eq!(
            run("current_mode == 'EDIT'", &vars).unwrap(),
            Scalar::Bool(true)
        );
        assert_eq!(
            run("current_mode != \"OBJECT\"", &vars).unwrap(),
            Scalar::Bool(true)
        );
        assert!(run("current_mode > 1", &vars).is_err());
    }

    #[test]
    fn test_mixed_equality_is_false_not_error() {
        let vars = scope(&[]);
        assert_eq!(run("'1' == 1", &vars).unwrap(), Scalar::Bool(false));
        assert_eq!(run("1 == 1.0", &vars).unwrap(), Scalar::Bool(true));
    }

    #[test]
    fn test_string_concatenation() {
        let vars = scope(&[("side", json!("left"))]);
        assert_eq!(
            run("'leg_' + side", &vars).unwrap(),
            Scalar::Str("leg_left".into())
        );
        assert!(run("'leg_' + 1", &vars).is_err());
    }

    #[test]
    fn test_integer_overflow_is_arithmetic_error() {
        let vars = scope(&[]);
        let err = run("9223372036854775807 + 1", &vars).unwrap_err();
        assert!(matches!(err, ExpressionError::Arithmetic { .. }));
    }

    #[test]
    fn test_stacked_scope_shadows() {
        let base = scope(&[("a", json!(1)), ("b", json!(2))]);
        let top = scope(&[("a", json!(10))]);
        let stacked = StackedScope::new(&top, &base);
        assert_eq!(eval(&parse("a + b").unwrap(), &stacked).unwrap(), Scalar::Int(12));
    }
}
