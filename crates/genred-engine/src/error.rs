//! Error types for binding, dispatch and reduction.
//!
//! Every error is raised while validating a call, before any pairwise
//! evaluation starts. Nothing is retried.

use std::fmt;
use thiserror::Error;

use genred_formula::FormulaError;

/// Main error type of the reduction engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReductionError {
    /// Malformed formula text, unknown operator or ill-typed formula
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Argument shape inconsistent with its alias declaration
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(ShapeMismatchError),

    /// Reduction incompatible with the formula's output dimension
    #[error("Dimension error: {0}")]
    Dimension(DimensionError),

    /// Requested backend cannot run on this device
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(BackendUnavailableError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Shape mismatch naming the offending variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMismatchError {
    /// Variable whose argument was rejected
    pub variable: String,
    /// Expected `(rows, cols)`; `None` where any size is accepted
    pub expected: (Option<usize>, Option<usize>),
    /// Actual `(rows, cols)`
    pub actual: (usize, usize),
    /// Additional context
    pub context: Option<String>,
}

fn fmt_extent(extent: Option<usize>) -> String {
    extent.map_or_else(|| "_".to_string(), |n| n.to_string())
}

impl fmt::Display for ShapeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argument '{}' expected shape ({}, {}), got ({}, {})",
            self.variable,
            fmt_extent(self.expected.0),
            fmt_extent(self.expected.1),
            self.actual.0,
            self.actual.1
        )?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

impl ShapeMismatchError {
    pub fn new(
        variable: impl Into<String>,
        expected: (Option<usize>, Option<usize>),
        actual: (usize, usize),
    ) -> Self {
        Self {
            variable: variable.into(),
            expected,
            actual,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Reduction incompatible with a formula's output dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionError {
    pub reduction: String,
    pub reason: String,
}

impl fmt::Display for DimensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} reduction: {}", self.reduction, self.reason)
    }
}

/// A backend request that cannot be honoured.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendUnavailableError {
    pub requested: String,
    pub device: String,
    pub reason: String,
}

impl fmt::Display for BackendUnavailableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not available on {}: {}",
            self.requested, self.device, self.reason
        )
    }
}

pub type ReductionResult<T> = Result<T, ReductionError>;

impl ReductionError {
    pub fn shape_mismatch(
        variable: impl Into<String>,
        expected: (Option<usize>, Option<usize>),
        actual: (usize, usize),
    ) -> Self {
        ReductionError::ShapeMismatch(ShapeMismatchError::new(variable, expected, actual))
    }

    pub fn dimension(reduction: impl Into<String>, reason: impl Into<String>) -> Self {
        ReductionError::Dimension(DimensionError {
            reduction: reduction.into(),
            reason: reason.into(),
        })
    }

    pub fn backend_unavailable(
        requested: impl Into<String>,
        device: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ReductionError::BackendUnavailable(BackendUnavailableError {
            requested: requested.into(),
            device: device.into(),
            reason: reason.into(),
        })
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ReductionError::Config(msg.into())
    }
}
