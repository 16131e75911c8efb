//! Closed whitelist of callable math functions

use super::error::ExpressionError;
use super::value::Scalar;

/// Every function an expression may call
pub const WHITELIST: &[&str] = &[
    "abs", "min", "max", "round", "floor", "ceil", "trunc", "sqrt", "pow", "hypot", "sin", "cos",
    "tan", "asin", "acos", "atan", "atan2", "degrees", "radians", "log", "log10", "exp",
];

pub fn is_whitelisted(name: &str) -> bool {
    WHITELIST.contains(&name)
}

/// Call a whitelisted function with already-evaluated arguments
pub fn call(name: &str, args: &[Scalar]) -> Result<Scalar, ExpressionError> {
    match name {
        "abs" => {
            expect_arity(name, args, 1, 1)?;
            match &args[0] {
                Scalar::Int(i) => i
                    .checked_abs()
                    .map(Scalar::Int)
                    .ok_or_else(|| overflow(name)),
                other => Ok(Scalar::Float(number(name, other)?.abs())),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExpressionError::arity(name, "at least 1", 0));
            }
            let mut best = &args[0];
            let mut best_value = number(name, best)?;
            for candidate in &args[1..] {
                let value = number(name, candidate)?;
                let better = if name == "min" {
                    value < best_value
                } else {
                    value > best_value
                };
                if better {
                    best = candidate;
                    best_value = value;
                }
            }
            Ok(best.clone())
        }
        "round" => {
            expect_arity(name, args, 1, 2)?;
            let x = number(name, &args[0])?;
            if args.len() == 2 {
                let digits = integer(name, &args[1])?;
                let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
                return finite(name, (x * factor).round_ties_even() / factor);
            }
            to_int(name, x.round_ties_even())
        }
        "floor" => unary_int(name, args, f64::floor),
        "ceil" => unary_int(name, args, f64::ceil),
        "trunc" => unary_int(name, args, f64::trunc),
        "sqrt" => {
            let x = single(name, args)?;
            if x < 0.0 {
                return Err(domain(name, "argument must be non-negative"));
            }
            finite(name, x.sqrt())
        }
        "pow" => {
            expect_arity(name, args, 2, 2)?;
            let base = number(name, &args[0])?;
            let exponent = number(name, &args[1])?;
            if base == 0.0 && exponent < 0.0 {
                return Err(domain(name, "zero cannot be raised to a negative power"));
            }
            finite(name, base.powf(exponent))
        }
        "hypot" => {
            if args.is_empty() {
                return Err(ExpressionError::arity(name, "at least 1", 0));
            }
            let mut sum = 0.0;
            for arg in args {
                let v = number(name, arg)?;
                sum += v * v;
            }
            finite(name, sum.sqrt())
        }
        "sin" => finite(name, single(name, args)?.sin()),
        "cos" => finite(name, single(name, args)?.cos()),
        "tan" => finite(name, single(name, args)?.tan()),
        "asin" | "acos" => {
            let x = single(name, args)?;
            if !(-1.0..=1.0).contains(&x) {
                return Err(domain(name, "argument must be within [-1, 1]"));
            }
            let result = if name == "asin" { x.asin() } else { x.acos() };
            finite(name, result)
        }
        "atan" => finite(name, single(name, args)?.atan()),
        "atan2" => {
            expect_arity(name, args, 2, 2)?;
            let y = number(name, &args[0])?;
            let x = number(name, &args[1])?;
            finite(name, y.atan2(x))
        }
        "degrees" => finite(name, single(name, args)?.to_degrees()),
        "radians" => finite(name, single(name, args)?.to_radians()),
        "log" => {
            expect_arity(name, args, 1, 2)?;
            let x = number(name, &args[0])?;
            if x <= 0.0 {
                return Err(domain(name, "argument must be positive"));
            }
            if args.len() == 2 {
                let base = number(name, &args[1])?;
                if base <= 0.0 || base == 1.0 {
                    return Err(domain(name, "base must be positive and not 1"));
                }
                return finite(name, x.ln() / base.ln());
            }
            finite(name, x.ln())
        }
        "log10" => {
            let x = single(name, args)?;
            if x <= 0.0 {
                return Err(domain(name, "argument must be positive"));
            }
            finite(name, x.log10())
        }
        "exp" => finite(name, single(name, args)?.exp()),
        _ => Err(ExpressionError::unknown_function(name, "")),
    }
}

fn expect_arity(name: &str, args: &[Scalar], min: usize, max: usize) -> Result<(), ExpressionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(ExpressionError::arity(name, expected, args.len()));
    }
    Ok(())
}

fn number(name: &str, value: &Scalar) -> Result<f64, ExpressionError> {
    value.as_f64().ok_or_else(|| {
        ExpressionError::type_error(
            format!("{}() expects a number, got {}", name, value.type_name()),
            "",
        )
    })
}

fn integer(name: &str, value: &Scalar) -> Result<i64, ExpressionError> {
    match value {
        Scalar::Int(i) => Ok(*i),
        other => Err(ExpressionError::type_error(
            format!("{}() expects an integer, got {}", name, other.type_name()),
            "",
        )),
    }
}

fn single(name: &str, args: &[Scalar]) -> Result<f64, ExpressionError> {
    expect_arity(name, args, 1, 1)?;
    number(name, &args[0])
}

fn unary_int(name: &str, args: &[Scalar], f: fn(f64) -> f64) -> Result<Scalar, ExpressionError> {
    let x = single(name, args)?;
    to_int(name, f(x))
}

fn to_int(name: &str, x: f64) -> Result<Scalar, ExpressionError> {
    if !x.is_finite() || x.abs() >= 9.2e18 {
        return Err(overflow(name));
    }
    Ok(Scalar::Int(x as i64))
}

fn finite(name: &str, x: f64) -> Result<Scalar, ExpressionError> {
    if !x.is_finite() {
        return Err(domain(name, "result is not a finite number"));
    }
    Ok(Scalar::Float(x))
}

fn domain(name: &str, message: &str) -> ExpressionError {
    ExpressionError::arithmetic(format!("{}(): {}", name, message), "")
}

fn overflow(name: &str) -> ExpressionError {
    ExpressionError::arithmetic(format!("{}(): integer overflow", name), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(result: Result<Scalar, ExpressionError>) -> f64 {
        match result.unwrap() {
            Scalar::Float(f) => f,
            Scalar::Int(i) => i as f64,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_atan2() {
        let value = float(call("atan2", &[Scalar::Int(4), Scalar::Int(2)]));
        assert!((value - 1.1071).abs() < 1e-4);
    }

    #[test]
    fn test_round_is_integer_with_ties_to_even() {
        assert_eq!(call("round", &[Scalar::Float(2.5)]).unwrap(), Scalar::Int(2));
        assert_eq!(call("round", &[Scalar::Float(3.5)]).unwrap(), Scalar::Int(4));
        let value = float(call("round", &[Scalar::Float(1.23456), Scalar::Int(2)]));
        assert!((value - 1.23).abs() < 1e-9);
    }

    #[test]
    fn test_floor_ceil_trunc() {
        assert_eq!(call("floor", &[Scalar::Float(-1.5)]).unwrap(), Scalar::Int(-2));
        assert_eq!(call("ceil", &[Scalar::Float(1.2)]).unwrap(), Scalar::Int(2));
        assert_eq!(call("trunc", &[Scalar::Float(-1.7)]).unwrap(), Scalar::Int(-1));
    }

    #[test]
    fn test_min_max_preserve_kind() {
        assert_eq!(
            call("min", &[Scalar::Int(3), Scalar::Float(1.5), Scalar::Int(2)]).unwrap(),
            Scalar::Float(1.5)
        );
        assert_eq!(
            call("max", &[Scalar::Int(3), Scalar::Float(1.5)]).unwrap(),
            Scalar::Int(3)
        );
    }

    #[test]
    fn test_asin_domain_error() {
        let err = call("asin", &[Scalar::Float(1.5)]).unwrap_err();
        assert!(matches!(err, ExpressionError::Arithmetic { .. }));
        assert!(call("asin", &[Scalar::Int(1)]).is_ok());
    }

    #[test]
    fn test_sqrt_and_log_domains() {
        assert!(call("sqrt", &[Scalar::Int(-1)]).is_err());
        assert!(call("log", &[Scalar::Int(0)]).is_err());
        assert!(call("log", &[Scalar::Int(8), Scalar::Int(1)]).is_err());
        let value = float(call("log", &[Scalar::Int(8), Scalar::Int(2)]));
        assert!((value - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_arity_checked() {
        let err = call("sqrt", &[Scalar::Int(1), Scalar::Int(2)]).unwrap_err();
        assert_eq!(err, ExpressionError::arity("sqrt", "1", 2));
        assert!(call("max", &[]).is_err());
    }

    #[test]
    fn test_string_argument_is_type_error() {
        let err = call("abs", &[Scalar::Str("x".into())]).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }

    #[test]
    fn test_whitelist_is_closed() {
        assert!(is_whitelisted("hypot"));
        assert!(!is_whitelisted("eval"));
        assert!(!is_whitelisted("open"));
        assert_eq!(WHITELIST.len(), 22);
    }
}
