//! Algebraic simplification.
//!
//! Bottom-up rewriting that folds constants and removes the zero and unit
//! factors produced by differentiation. Every rewrite preserves the output
//! dimension of the node it replaces.

use crate::expr::Formula;
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};

/// Simplify a formula.
pub fn simplify(formula: &Formula) -> Formula {
    match formula {
        Formula::Var(_) | Formula::Const(_) | Formula::Zero(_) => formula.clone(),
        Formula::Unary { op, arg, dim } => simplify_unary(*op, simplify(arg), *dim),
        Formula::Binary { op, lhs, rhs, dim } => {
            simplify_binary(*op, simplify(lhs), simplify(rhs), *dim)
        }
        Formula::Ternary { op, args, dim } => simplify_ternary(
            *op,
            simplify(&args[0]),
            simplify(&args[1]),
            simplify(&args[2]),
            *dim,
        ),
    }
}

fn is_one(f: &Formula) -> bool {
    f.as_const() == Some(1.0)
}

fn zero_of(dim: usize) -> Formula {
    if dim == 1 {
        Formula::Const(0.0)
    } else {
        Formula::Zero(dim)
    }
}

fn unary_node(op: UnaryOp, arg: Formula, dim: usize) -> Formula {
    Formula::Unary {
        op,
        arg: Box::new(arg),
        dim,
    }
}

fn simplify_unary(op: UnaryOp, arg: Formula, dim: usize) -> Formula {
    if let Some(c) = arg.as_const() {
        match op {
            UnaryOp::Broadcast(_) | UnaryOp::ExtractT { .. } => {}
            UnaryOp::Sum | UnaryOp::Extract { .. } => return Formula::Const(c),
            _ => return Formula::Const(op.apply_scalar(c)),
        }
    }

    if matches!(arg, Formula::Zero(_)) {
        let vanishes = match op {
            UnaryOp::Minus
            | UnaryOp::Square
            | UnaryOp::Sqrt
            | UnaryOp::Sin
            | UnaryOp::Abs
            | UnaryOp::Sign
            | UnaryOp::ReLU
            | UnaryOp::SqNorm2
            | UnaryOp::Norm2
            | UnaryOp::Sum
            | UnaryOp::Extract { .. }
            | UnaryOp::ExtractT { .. }
            | UnaryOp::Broadcast(_) => true,
            UnaryOp::Pow(n) => n > 0,
            _ => false,
        };
        if vanishes {
            return zero_of(dim);
        }
    }
    if arg.as_const() == Some(0.0) && matches!(op, UnaryOp::Broadcast(_) | UnaryOp::ExtractT { .. })
    {
        return zero_of(dim);
    }

    match (op, &arg) {
        (UnaryOp::Minus, Formula::Unary { op: UnaryOp::Minus, arg: inner, .. }) => {
            return inner.as_ref().clone();
        }
        (UnaryOp::Pow(1), _) => return arg,
        (UnaryOp::Pow(0), _) => {
            return if dim == 1 {
                Formula::Const(1.0)
            } else {
                unary_node(UnaryOp::Broadcast(dim), Formula::Const(1.0), dim)
            }
        }
        (UnaryOp::Sum, _) if arg.dim() == 1 => return arg,
        (UnaryOp::Extract { start: 0, len }, _) if len == arg.dim() => return arg,
        (UnaryOp::Broadcast(1), _) => return arg,
        _ => {}
    }
    unary_node(op, arg, dim)
}

fn simplify_binary(op: BinaryOp, lhs: Formula, rhs: Formula, dim: usize) -> Formula {
    if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
        match op {
            BinaryOp::Concat => {}
            _ => return Formula::Const(op.apply_scalar(a, b)),
        }
    }

    match op {
        BinaryOp::Add => {
            if lhs.is_zero() && rhs.dim() == dim {
                return rhs;
            }
            if rhs.is_zero() && lhs.dim() == dim {
                return lhs;
            }
        }
        BinaryOp::Sub => {
            if rhs.is_zero() && lhs.dim() == dim {
                return lhs;
            }
            if lhs.is_zero() && rhs.dim() == dim {
                return simplify_unary(UnaryOp::Minus, rhs, dim);
            }
        }
        BinaryOp::Mul => {
            if lhs.is_zero() || rhs.is_zero() {
                return zero_of(dim);
            }
            if is_one(&lhs) && rhs.dim() == dim {
                return rhs;
            }
            if is_one(&rhs) && lhs.dim() == dim {
                return lhs;
            }
            if lhs.as_const() == Some(-1.0) && rhs.dim() == dim {
                return simplify_unary(UnaryOp::Minus, rhs, dim);
            }
        }
        BinaryOp::Div => {
            if lhs.is_zero() {
                return zero_of(dim);
            }
            if is_one(&rhs) && lhs.dim() == dim {
                return lhs;
            }
        }
        BinaryOp::SqDist | BinaryOp::Scalprod => {
            if op == BinaryOp::Scalprod && (lhs.is_zero() || rhs.is_zero()) {
                return Formula::Const(0.0);
            }
        }
        BinaryOp::Concat => {
            if lhs.is_zero() && rhs.is_zero() {
                return zero_of(dim);
            }
        }
    }

    Formula::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        dim,
    }
}

fn simplify_ternary(op: TernaryOp, cond: Formula, a: Formula, b: Formula, dim: usize) -> Formula {
    match op {
        TernaryOp::IfElse => {
            if let Some(c) = cond.as_const() {
                return if c >= 0.0 { a } else { b };
            }
            if a.is_zero() && b.is_zero() {
                return zero_of(dim);
            }
            if a == b {
                return a;
            }
        }
    }
    Formula::Ternary {
        op,
        args: Box::new([cond, a, b]),
        dim,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{Category, Variable};

    fn x() -> Formula {
        Formula::var(Variable::new("x", 0, Category::IndexedByI, 3))
    }

    fn s() -> Formula {
        Formula::var(Variable::new("s", 1, Category::IndexedByJ, 1))
    }

    #[test]
    fn test_constant_folding() {
        let f = Formula::add(Formula::constant(2.0), Formula::constant(3.0)).unwrap();
        assert_eq!(simplify(&f), Formula::Const(5.0));

        let g = Formula::exp(Formula::constant(0.0)).unwrap();
        assert_eq!(simplify(&g), Formula::Const(1.0));
    }

    #[test]
    fn test_zero_and_unit_elimination() {
        let f = Formula::mul(Formula::constant(1.0), x()).unwrap();
        assert_eq!(simplify(&f), x());

        let g = Formula::add(Formula::zero(3), x()).unwrap();
        assert_eq!(simplify(&g), x());

        let h = Formula::mul(Formula::zero(3), x()).unwrap();
        assert_eq!(simplify(&h), Formula::Zero(3));

        let k = Formula::neg(Formula::neg(x()).unwrap()).unwrap();
        assert_eq!(simplify(&k), x());
    }

    #[test]
    fn test_broadcast_zero_keeps_dimension() {
        // 0 (dim 3) + s (dim 1) must stay a vector.
        let f = Formula::add(Formula::zero(3), s()).unwrap();
        let simplified = simplify(&f);
        assert_eq!(simplified.dim(), 3);
    }

    #[test]
    fn test_if_else_constant_condition() {
        let f = Formula::if_else(Formula::constant(-1.0), x(), Formula::zero(3)).unwrap();
        assert_eq!(simplify(&f), Formula::Zero(3));
    }

    #[test]
    fn test_simplify_preserves_dim() {
        let f = Formula::unary(UnaryOp::Pow(0), x()).unwrap();
        assert_eq!(simplify(&f).dim(), 3);
        let g = Formula::unary(UnaryOp::Extract { start: 0, len: 3 }, x()).unwrap();
        assert_eq!(simplify(&g), x());
    }
}
