//! Reduction descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use genred_formula::{Category, FormulaError};

use crate::error::{ReductionError, ReductionResult};

/// Accumulation operator applied along the reduced index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReductionOp {
    Sum,
    Max,
    Min,
    /// Index of the maximum, first index wins on ties
    ArgMax,
    /// Index of the minimum, first index wins on ties
    ArgMin,
    LogSumExp,
    /// `sum_j exp(K_ij) w_j / sum_j exp(K_ij)` with weights from a second formula
    SoftMax,
}

impl ReductionOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionOp::Sum => "Sum",
            ReductionOp::Max => "Max",
            ReductionOp::Min => "Min",
            ReductionOp::ArgMax => "ArgMax",
            ReductionOp::ArgMin => "ArgMin",
            ReductionOp::LogSumExp => "LogSumExp",
            ReductionOp::SoftMax => "SoftMax",
        }
    }

    /// Whether the formula must be scalar.
    pub fn requires_scalar(&self) -> bool {
        matches!(
            self,
            ReductionOp::ArgMax | ReductionOp::ArgMin | ReductionOp::LogSumExp | ReductionOp::SoftMax
        )
    }

    /// Whether the reduction has no value on an empty reduced axis.
    pub fn requires_nonempty(&self) -> bool {
        matches!(
            self,
            ReductionOp::ArgMax | ReductionOp::ArgMin | ReductionOp::SoftMax
        )
    }

    pub fn uses_formula2(&self) -> bool {
        matches!(self, ReductionOp::SoftMax)
    }
}

impl fmt::Display for ReductionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ReductionOp {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sum" => Ok(ReductionOp::Sum),
            "Max" => Ok(ReductionOp::Max),
            "Min" => Ok(ReductionOp::Min),
            "ArgMax" => Ok(ReductionOp::ArgMax),
            "ArgMin" => Ok(ReductionOp::ArgMin),
            "LogSumExp" | "LSE" => Ok(ReductionOp::LogSumExp),
            "SoftMax" | "SumSoftMax" | "SumSoftMaxWeight" => Ok(ReductionOp::SoftMax),
            other => Err(FormulaError::UnknownOperator {
                name: other.to_string(),
            }
            .into()),
        }
    }
}

/// Which index is summed away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    /// Reduce over `j`; one output row per `i`
    #[default]
    ReduceOverJ,
    /// Reduce over `i`; one output row per `j`
    ReduceOverI,
}

impl Axis {
    /// `Genred`-style axis: `1` sums over `j`, `0` sums over `i`.
    pub fn from_genred_axis(axis: u8) -> ReductionResult<Self> {
        match axis {
            1 => Ok(Axis::ReduceOverJ),
            0 => Ok(Axis::ReduceOverI),
            _ => Err(ReductionError::dimension(
                "axis",
                format!("axis must be 0 or 1, got {}", axis),
            )),
        }
    }

    /// Legacy sum-index convention: `0` sums over `j`, `1` sums over `i`.
    pub fn from_sum_index(index: u8) -> ReductionResult<Self> {
        match index {
            0 => Ok(Axis::ReduceOverJ),
            1 => Ok(Axis::ReduceOverI),
            _ => Err(ReductionError::dimension(
                "sum_index",
                format!("sum index must be 0 or 1, got {}", index),
            )),
        }
    }

    /// Category of the index that survives the reduction.
    pub fn surviving(&self) -> Category {
        match self {
            Axis::ReduceOverJ => Category::IndexedByI,
            Axis::ReduceOverI => Category::IndexedByJ,
        }
    }

    /// Category of the index that is summed away.
    pub fn reduced(&self) -> Category {
        self.surviving().transposed()
    }

    pub fn flipped(&self) -> Self {
        match self {
            Axis::ReduceOverJ => Axis::ReduceOverI,
            Axis::ReduceOverI => Axis::ReduceOverJ,
        }
    }
}

/// Operator and axis of one reduction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReductionDescriptor {
    pub op: ReductionOp,
    pub axis: Axis,
}

impl ReductionDescriptor {
    pub fn new(op: ReductionOp, axis: Axis) -> Self {
        Self { op, axis }
    }

    pub fn sum(axis: Axis) -> Self {
        Self::new(ReductionOp::Sum, axis)
    }

    /// Check the formula dimensions and return the output dimension.
    pub fn validate(&self, formula_dim: usize, formula2_dim: Option<usize>) -> ReductionResult<usize> {
        if self.op.requires_scalar() && formula_dim != 1 {
            return Err(ReductionError::dimension(
                self.op.name(),
                format!("expects a scalar formula, got dimension {}", formula_dim),
            ));
        }
        match (self.op.uses_formula2(), formula2_dim) {
            (true, Some(d)) => Ok(d),
            (true, None) => Err(ReductionError::dimension(
                self.op.name(),
                "requires a weight formula (formula2)",
            )),
            (false, Some(_)) => Err(ReductionError::dimension(
                self.op.name(),
                "does not take a weight formula (formula2)",
            )),
            (false, None) => Ok(formula_dim),
        }
    }
}

impl fmt::Display for ReductionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.op, self.axis)
    }
}
