//! Error types for expression compilation and evaluation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("Unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Expression nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    Overflow,
}

pub type Result<T> = std::result::Result<T, ExprError>;
