//! Symbolic reverse-mode differentiation.
//!
//! [`Formula::grad`] builds the vector-Jacobian product of a formula: given
//! `F` of dimension `d`, a variable `v` and a formula `e` of dimension `d`,
//! `F.grad(v, e)` is a formula of dimension `v.dim` equal to
//! `sum_k e[k] * dF[k]/dv`.

use crate::error::{FormulaError, FormulaResult};
use crate::expr::Formula;
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::simplify::simplify;
use crate::variable::Variable;

impl Formula {
    /// Vector-Jacobian product with respect to `wrt`, contracted against `grad_in`.
    pub fn grad(&self, wrt: &Variable, grad_in: &Formula) -> FormulaResult<Formula> {
        if grad_in.dim() != self.dim() {
            return Err(FormulaError::dimension_mismatch(
                "Grad",
                self.dim(),
                grad_in.dim(),
            ));
        }
        let raw = vjp(self, wrt, grad_in)?;
        Ok(match raw {
            Some(g) => simplify(&g),
            None => Formula::Zero(wrt.dim),
        })
    }

    /// Gradient of the sum of all output coordinates.
    pub fn diff(&self, wrt: &Variable) -> FormulaResult<Formula> {
        let ones = match self.dim() {
            1 => Formula::constant(1.0),
            d => Formula::unary(UnaryOp::Broadcast(d), Formula::constant(1.0))?,
        };
        self.grad(wrt, &ones)
    }
}

/// Sum the contribution of a broadcast scalar operand.
fn reduce_to(contrib: Formula, dim: usize) -> FormulaResult<Formula> {
    if contrib.dim() == dim {
        Ok(contrib)
    } else {
        Formula::sum(contrib)
    }
}

fn accumulate(acc: Option<Formula>, term: Option<Formula>) -> FormulaResult<Option<Formula>> {
    Ok(match (acc, term) {
        (Some(a), Some(b)) => Some(Formula::add(a, b)?),
        (a, None) => a,
        (None, b) => b,
    })
}

/// `None` stands for an identically zero gradient.
fn vjp(node: &Formula, wrt: &Variable, g: &Formula) -> FormulaResult<Option<Formula>> {
    if !node.depends_on(wrt) {
        return Ok(None);
    }
    match node {
        Formula::Var(v) => Ok(v.same_slot(wrt).then(|| g.clone())),
        Formula::Const(_) | Formula::Zero(_) => Ok(None),
        Formula::Unary { op, arg, .. } => {
            let a = arg.as_ref().clone();
            let upstream = match *op {
                UnaryOp::Minus => Formula::neg(g.clone())?,
                UnaryOp::Square => Formula::mul(
                    Formula::mul(Formula::constant(2.0), a)?,
                    g.clone(),
                )?,
                UnaryOp::Exp => Formula::mul(node.clone(), g.clone())?,
                UnaryOp::Log => Formula::div(g.clone(), a)?,
                UnaryOp::Sqrt => Formula::mul(
                    Formula::mul(Formula::constant(0.5), Formula::unary(UnaryOp::Rsqrt, a)?)?,
                    g.clone(),
                )?,
                UnaryOp::Rsqrt => Formula::mul(
                    Formula::mul(
                        Formula::constant(-0.5),
                        Formula::unary(UnaryOp::Pow(3), node.clone())?,
                    )?,
                    g.clone(),
                )?,
                UnaryOp::Inv => Formula::mul(
                    Formula::neg(Formula::square(node.clone())?)?,
                    g.clone(),
                )?,
                UnaryOp::Sin => Formula::mul(Formula::unary(UnaryOp::Cos, a)?, g.clone())?,
                UnaryOp::Cos => Formula::mul(
                    Formula::neg(Formula::unary(UnaryOp::Sin, a)?)?,
                    g.clone(),
                )?,
                UnaryOp::Abs => Formula::mul(Formula::unary(UnaryOp::Sign, a)?, g.clone())?,
                UnaryOp::Sign | UnaryOp::Step => return Ok(None),
                UnaryOp::ReLU => Formula::mul(Formula::unary(UnaryOp::Step, a)?, g.clone())?,
                UnaryOp::SqNorm2 => Formula::mul(
                    Formula::mul(Formula::constant(2.0), a)?,
                    g.clone(),
                )?,
                UnaryOp::Norm2 => {
                    let inv_norm = Formula::unary(
                        UnaryOp::Rsqrt,
                        Formula::unary(UnaryOp::SqNorm2, a.clone())?,
                    )?;
                    Formula::mul(Formula::mul(a, inv_norm)?, g.clone())?
                }
                UnaryOp::Sum => {
                    if a.dim() == 1 {
                        g.clone()
                    } else {
                        Formula::unary(UnaryOp::Broadcast(a.dim()), g.clone())?
                    }
                }
                UnaryOp::Pow(n) => {
                    if n == 0 {
                        return Ok(None);
                    }
                    Formula::mul(
                        Formula::mul(
                            Formula::int_cst(n as i64),
                            Formula::unary(UnaryOp::Pow(n - 1), a)?,
                        )?,
                        g.clone(),
                    )?
                }
                UnaryOp::Extract { start, .. } => Formula::unary(
                    UnaryOp::ExtractT {
                        start,
                        dim: a.dim(),
                    },
                    g.clone(),
                )?,
                UnaryOp::ExtractT { start, .. } => Formula::unary(
                    UnaryOp::Extract {
                        start,
                        len: a.dim(),
                    },
                    g.clone(),
                )?,
                UnaryOp::Broadcast(_) => Formula::sum(g.clone())?,
            };
            vjp(arg, wrt, &reduce_to(upstream, arg.dim())?)
        }
        Formula::Binary { op, lhs, rhs, .. } => {
            let a = lhs.as_ref().clone();
            let b = rhs.as_ref().clone();
            let (ga, gb) = match op {
                BinaryOp::Add => (g.clone(), g.clone()),
                BinaryOp::Sub => (g.clone(), Formula::neg(g.clone())?),
                BinaryOp::Mul => (Formula::mul(g.clone(), b)?, Formula::mul(g.clone(), a)?),
                BinaryOp::Div => {
                    let ga = Formula::div(g.clone(), b.clone())?;
                    let gb = Formula::neg(Formula::div(
                        Formula::mul(g.clone(), a)?,
                        Formula::square(b)?,
                    )?)?;
                    (ga, gb)
                }
                BinaryOp::SqDist => {
                    let ga = Formula::mul(
                        Formula::mul(Formula::constant(2.0), Formula::sub(a, b)?)?,
                        g.clone(),
                    )?;
                    (ga.clone(), Formula::neg(ga)?)
                }
                BinaryOp::Scalprod => (Formula::mul(b, g.clone())?, Formula::mul(a, g.clone())?),
                BinaryOp::Concat => {
                    let (da, db) = (a.dim(), b.dim());
                    (
                        Formula::unary(UnaryOp::Extract { start: 0, len: da }, g.clone())?,
                        Formula::unary(UnaryOp::Extract { start: da, len: db }, g.clone())?,
                    )
                }
            };
            let left = vjp(lhs, wrt, &reduce_to(ga, lhs.dim())?)?;
            let right = vjp(rhs, wrt, &reduce_to(gb, rhs.dim())?)?;
            accumulate(left, right)
        }
        Formula::Ternary { op, args, dim } => match op {
            TernaryOp::IfElse => {
                let cond = args[0].clone();
                let zero = Formula::zero(*dim);
                let ga = Formula::if_else(cond.clone(), g.clone(), zero.clone())?;
                let gb = Formula::if_else(cond, zero, g.clone())?;
                let left = vjp(&args[1], wrt, &ga)?;
                let right = vjp(&args[2], wrt, &gb)?;
                accumulate(left, right)
            }
        },
    }
}
