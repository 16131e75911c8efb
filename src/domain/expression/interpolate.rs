//! `{var}` text interpolation
//!
//! Plain string substitution that runs before any expression is parsed, so
//! substituted text may itself end up inside a `$CALCULATE(...)` or a condition.
//! `{{` and `}}` produce literal braces. A placeholder naming a variable the
//! scope does not hold is an error, never an empty string.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use super::evaluator::VariableScope;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InterpolationError {
    #[error("Unresolved placeholder '{{{placeholder}}}' in '{template}'")]
    Unresolved {
        placeholder: String,
        template: String,
    },

    #[error("Malformed template '{template}' at position {position}: {message}")]
    Malformed {
        template: String,
        position: usize,
        message: String,
    },
}

/// Result of interpolating one string
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub text: String,
    /// Variable names substituted into the text
    pub referenced: BTreeSet<String>,
}

/// Whether the string holds any `{` or `}` at all
pub fn has_placeholders(template: &str) -> bool {
    template.contains('{') || template.contains('}')
}

/// Substitute every `{name}` in `template` from `scope`
pub fn interpolate(
    template: &str,
    scope: &dyn VariableScope,
) -> Result<Interpolated, InterpolationError> {
    let mut referenced = BTreeSet::new();

    if !has_placeholders(template) {
        return Ok(Interpolated {
            text: template.to_string(),
            referenced,
        });
    }

    let chars: Vec<char> = template.chars().collect();
    let mut text = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '{' => {
                let start = i;
                let Some(offset) = chars[i + 1..].iter().position(|c| *c == '}') else {
                    return Err(malformed(template, start, "unclosed '{'"));
                };
                let name: String = chars[i + 1..i + 1 + offset].iter().collect();
                let name = name.trim();

                if !is_identifier(name) {
                    return Err(malformed(
                        template,
                        start,
                        format!("'{}' is not a variable name", name),
                    ));
                }

                let Some(value) = scope.lookup(name) else {
                    return Err(InterpolationError::Unresolved {
                        placeholder: name.to_string(),
                        template: template.to_string(),
                    });
                };

                text.push_str(&value_to_text(value));
                referenced.insert(name.to_string());
                i += offset + 2;
            }
            '}' => {
                return Err(malformed(template, i, "single '}' must be escaped as '}}'"));
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Ok(Interpolated { text, referenced })
}

/// Render a value the way it reads inside an expression
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn malformed(template: &str, position: usize, message: impl Into<String>) -> InterpolationError {
    InterpolationError::Malformed {
        template: template.to_string(),
        position,
        message: message.into(),
    }
}
