//! Expression error types

use thiserror::Error;

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position} in '{expression}': {message}")]
    Syntax {
        expression: String,
        position: usize,
        message: String,
    },

    #[error("Unknown symbol '{name}' in '{expression}'")]
    UnknownSymbol { name: String, expression: String },

    #[error("Unknown function '{name}' in '{expression}'")]
    UnknownFunction { name: String, expression: String },

    #[error("Arithmetic error in '{expression}': {message}")]
    Arithmetic { message: String, expression: String },

    #[error("Type error in '{expression}': {message}")]
    Type { message: String, expression: String },

    #[error("Function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
}

impl ExpressionError {
    pub fn syntax(
        expression: impl Into<String>,
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            expression: expression.into(),
            position,
            message: message.into(),
        }
    }

    pub fn unknown_symbol(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::UnknownSymbol {
            name: name.into(),
            expression: expression.into(),
        }
    }

    pub fn unknown_function(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::UnknownFunction {
            name: name.into(),
            expression: expression.into(),
        }
    }

    pub fn arithmetic(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Arithmetic {
            message: message.into(),
            expression: expression.into(),
        }
    }

    pub fn type_error(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
            expression: expression.into(),
        }
    }

    pub fn arity(function: impl Into<String>, expected: impl Into<String>, found: usize) -> Self {
        Self::Arity {
            function: function.into(),
            expected: expected.into(),
            found,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } | Self::Arity { .. } => "syntax_error",
            Self::UnknownSymbol { .. } => "unknown_symbol",
            Self::UnknownFunction { .. } => "unknown_function",
            Self::Arithmetic { .. } => "arithmetic_error",
            Self::Type { .. } => "type_error",
        }
    }

    /// Attach the full expression text to errors raised without it
    pub(crate) fn in_expression(self, source: &str) -> Self {
        match self {
            Self::UnknownSymbol { name, expression } if expression.is_empty() => {
                Self::unknown_symbol(name, source)
            }
            Self::UnknownFunction { name, expression } if expression.is_empty() => {
                Self::unknown_function(name, source)
            }
            Self::Arithmetic {
                message,
                expression,
            } if expression.is_empty() => Self::arithmetic(message, source),
            Self::Type {
                message,
                expression,
            } if expression.is_empty() => Self::type_error(message, source),
            other => other,
        }
    }
}
