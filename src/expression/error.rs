use thiserror::Error;

/// Errors produced while parsing, compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset} in \"{expression}\": {message}")]
    Syntax {
        expression: String,
        offset: usize,
        message: String,
    },

    #[error("variable \"{name}\" is not valid")]
    UnknownVariable { name: String },

    #[error("the function \"{name}\" does not exist")]
    UnknownFunction { name: String },

    #[error("unsupported operand types for '{op}': {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported operand type for '{op}': {operand}")]
    InvalidOperand { op: String, operand: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{op}'")]
    Overflow { op: String },

    #[error("function \"{function}\" failed: {message}")]
    Function { function: String, message: String },
}

impl ExpressionError {
    /// Convenience constructor for failures raised by function implementations.
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.into(),
            message: message.into(),
        }
    }
}
