//! The closed set of formula operators.
//!
//! Every operator knows its call name, its arity and how to infer its output
//! dimension from the dimensions of its operands. Differentiation rules live
//! in [`crate::diff`].

use serde::{Deserialize, Serialize};

use crate::error::{FormulaError, FormulaResult};

/// Single-operand operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Square,
    Exp,
    Log,
    Sqrt,
    /// `1 / sqrt(x)`
    Rsqrt,
    /// `1 / x`
    Inv,
    Sin,
    Cos,
    Abs,
    /// `-1`, `0` or `1`
    Sign,
    /// `1` where `x >= 0`, else `0`
    Step,
    ReLU,
    /// Squared euclidean norm, always scalar
    SqNorm2,
    /// Euclidean norm, always scalar
    Norm2,
    /// Sum of the coordinates, always scalar
    Sum,
    /// Integer power, elementwise
    Pow(i32),
    /// Coordinates `start..start+len`
    Extract { start: usize, len: usize },
    /// Adjoint of `Extract`: embeds the operand at `start` in a zero vector of size `dim`
    ExtractT { start: usize, dim: usize },
    /// Repeat a scalar `dim` times
    Broadcast(usize),
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "Minus",
            UnaryOp::Square => "Square",
            UnaryOp::Exp => "Exp",
            UnaryOp::Log => "Log",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Rsqrt => "Rsqrt",
            UnaryOp::Inv => "Inv",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
            UnaryOp::Abs => "Abs",
            UnaryOp::Sign => "Sign",
            UnaryOp::Step => "Step",
            UnaryOp::ReLU => "ReLU",
            UnaryOp::SqNorm2 => "SqNorm2",
            UnaryOp::Norm2 => "Norm2",
            UnaryOp::Sum => "Sum",
            UnaryOp::Pow(_) => "Pow",
            UnaryOp::Extract { len: 1, .. } => "Elem",
            UnaryOp::Extract { .. } => "Extract",
            UnaryOp::ExtractT { .. } => "ExtractT",
            UnaryOp::Broadcast(_) => "Broadcast",
        }
    }

    /// Look up an operator without integer attributes by its call name.
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "Minus" => UnaryOp::Minus,
            "Square" => UnaryOp::Square,
            "Exp" => UnaryOp::Exp,
            "Log" => UnaryOp::Log,
            "Sqrt" => UnaryOp::Sqrt,
            "Rsqrt" => UnaryOp::Rsqrt,
            "Inv" | "Inverse" => UnaryOp::Inv,
            "Sin" => UnaryOp::Sin,
            "Cos" => UnaryOp::Cos,
            "Abs" => UnaryOp::Abs,
            "Sign" => UnaryOp::Sign,
            "Step" => UnaryOp::Step,
            "ReLU" | "Relu" => UnaryOp::ReLU,
            "SqNorm2" => UnaryOp::SqNorm2,
            "Norm2" => UnaryOp::Norm2,
            "Sum" => UnaryOp::Sum,
            _ => return None,
        };
        Some(op)
    }

    /// Output dimension for an operand of dimension `dim`.
    pub fn output_dim(&self, dim: usize) -> FormulaResult<usize> {
        match *self {
            UnaryOp::SqNorm2 | UnaryOp::Norm2 | UnaryOp::Sum => Ok(1),
            UnaryOp::Extract { start, len } => {
                if len == 0 || start + len > dim {
                    Err(FormulaError::invalid_dimension(
                        self.name(),
                        format!(
                            "range {}..{} out of bounds for dimension {}",
                            start,
                            start + len,
                            dim
                        ),
                    ))
                } else {
                    Ok(len)
                }
            }
            UnaryOp::ExtractT { start, dim: out } => {
                if start + dim > out {
                    Err(FormulaError::invalid_dimension(
                        self.name(),
                        format!(
                            "operand of dimension {} does not fit at {} in dimension {}",
                            dim, start, out
                        ),
                    ))
                } else {
                    Ok(out)
                }
            }
            UnaryOp::Broadcast(out) => {
                if dim != 1 {
                    Err(FormulaError::invalid_dimension(
                        self.name(),
                        format!("expects a scalar operand, got dimension {}", dim),
                    ))
                } else if out == 0 {
                    Err(FormulaError::invalid_dimension(
                        self.name(),
                        "target dimension must be positive",
                    ))
                } else {
                    Ok(out)
                }
            }
            _ => Ok(dim),
        }
    }

    /// Whether the operator acts coordinate by coordinate.
    pub fn is_elementwise(&self) -> bool {
        !matches!(
            self,
            UnaryOp::SqNorm2
                | UnaryOp::Norm2
                | UnaryOp::Sum
                | UnaryOp::Extract { .. }
                | UnaryOp::ExtractT { .. }
                | UnaryOp::Broadcast(_)
        )
    }

    /// Scalar kernel of an elementwise operator.
    pub fn apply_scalar(&self, x: f64) -> f64 {
        match *self {
            UnaryOp::Minus => -x,
            UnaryOp::Square => x * x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Rsqrt => {
                if x == 0.0 {
                    0.0
                } else {
                    1.0 / x.sqrt()
                }
            }
            UnaryOp::Inv => 1.0 / x,
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            UnaryOp::Step => {
                if x >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryOp::ReLU => x.max(0.0),
            UnaryOp::Pow(n) => x.powi(n),
            UnaryOp::SqNorm2 => x * x,
            UnaryOp::Norm2 => x.abs(),
            UnaryOp::Sum | UnaryOp::Extract { .. } | UnaryOp::ExtractT { .. } | UnaryOp::Broadcast(_) => x,
        }
    }
}

/// Two-operand operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Squared euclidean distance, scalar
    SqDist,
    /// Dot product, scalar
    Scalprod,
    /// Vector concatenation
    Concat,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Subtract",
            BinaryOp::Mul => "Mult",
            BinaryOp::Div => "Divide",
            BinaryOp::SqDist => "SqDist",
            BinaryOp::Scalprod => "Scalprod",
            BinaryOp::Concat => "Concat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "Add" => BinaryOp::Add,
            "Subtract" => BinaryOp::Sub,
            "Mult" => BinaryOp::Mul,
            "Divide" => BinaryOp::Div,
            "SqDist" => BinaryOp::SqDist,
            "Scalprod" => BinaryOp::Scalprod,
            "Concat" => BinaryOp::Concat,
            _ => return None,
        };
        Some(op)
    }

    /// Infix symbol for the arithmetic operators.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            BinaryOp::Add => Some("+"),
            BinaryOp::Sub => Some("-"),
            BinaryOp::Mul => Some("*"),
            BinaryOp::Div => Some("/"),
            _ => None,
        }
    }

    /// Whether a scalar operand is broadcast against a vector one.
    pub fn broadcasts(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn output_dim(&self, lhs: usize, rhs: usize) -> FormulaResult<usize> {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                if lhs == rhs || rhs == 1 {
                    Ok(lhs)
                } else if lhs == 1 {
                    Ok(rhs)
                } else {
                    Err(FormulaError::dimension_mismatch(self.name(), lhs, rhs))
                }
            }
            BinaryOp::SqDist | BinaryOp::Scalprod => {
                if lhs == rhs {
                    Ok(1)
                } else {
                    Err(FormulaError::dimension_mismatch(self.name(), lhs, rhs))
                }
            }
            BinaryOp::Concat => Ok(lhs + rhs),
        }
    }

    /// Scalar kernel of the broadcasting operators.
    pub fn apply_scalar(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::SqDist => (a - b) * (a - b),
            BinaryOp::Scalprod => a * b,
            BinaryOp::Concat => a,
        }
    }
}

/// Three-operand operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TernaryOp {
    /// `IfElse(c, a, b)`: `a` where `c >= 0`, else `b`
    IfElse,
}

impl TernaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            TernaryOp::IfElse => "IfElse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "IfElse" => Some(TernaryOp::IfElse),
            _ => None,
        }
    }

    pub fn output_dim(&self, cond: usize, a: usize, b: usize) -> FormulaResult<usize> {
        match self {
            TernaryOp::IfElse => {
                if a != b {
                    return Err(FormulaError::dimension_mismatch(self.name(), a, b));
                }
                if cond != 1 && cond != a {
                    return Err(FormulaError::dimension_mismatch(self.name(), cond, a));
                }
                Ok(a)
            }
        }
    }
}
