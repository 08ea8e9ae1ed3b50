//! Error types for formula construction and parsing.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },
    #[error("Unknown operator '{name}'")]
    UnknownOperator { name: String },
    #[error("Operator {name} arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Operator {name} expects an integer literal for argument {arg_index}")]
    ExpectedInteger { name: String, arg_index: usize },
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },
    #[error("Operator {op} cannot combine dimensions {lhs} and {rhs}")]
    DimensionMismatch { op: String, lhs: usize, rhs: usize },
    #[error("Operator {op}: {reason}")]
    InvalidDimension { op: String, reason: String },
    #[error("Invalid alias '{decl}': {reason}")]
    InvalidAlias { decl: String, reason: String },
    #[error("Alias '{name}' declared twice")]
    DuplicateAlias { name: String },
    #[error("Position {position} bound by both '{first}' and '{second}'")]
    DuplicatePosition {
        position: usize,
        first: String,
        second: String,
    },
}

impl FormulaError {
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        FormulaError::Syntax {
            message: message.into(),
            offset,
        }
    }

    pub fn dimension_mismatch(op: impl Into<String>, lhs: usize, rhs: usize) -> Self {
        FormulaError::DimensionMismatch {
            op: op.into(),
            lhs,
            rhs,
        }
    }

    pub fn invalid_dimension(op: impl Into<String>, reason: impl Into<String>) -> Self {
        FormulaError::InvalidDimension {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_alias(decl: impl Into<String>, reason: impl Into<String>) -> Self {
        FormulaError::InvalidAlias {
            decl: decl.into(),
            reason: reason.into(),
        }
    }
}

pub type FormulaResult<T> = Result<T, FormulaError>;
