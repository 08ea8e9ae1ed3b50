//! Display implementations.
//!
//! Formulas print in the same operator-call syntax the parser accepts, so
//! `parse(&f.to_string(), aliases)` rebuilds `f`.

use std::fmt;

use crate::expr::Formula;
use crate::ops::{BinaryOp, UnaryOp};

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Var(v) => write!(f, "{}", v.name),
            Formula::Const(c) if c.is_nan() => write!(f, "NaN"),
            Formula::Const(c) if c.is_infinite() => {
                write!(f, "{}Inf", if *c < 0.0 { "-" } else { "" })
            }
            Formula::Const(c) => write!(f, "{}", c),
            Formula::Zero(d) => write!(f, "Zero({})", d),
            Formula::Unary { op, arg, .. } => match op {
                UnaryOp::Pow(n) => write!(f, "Pow({}, {})", arg, n),
                UnaryOp::Extract { start, len: 1 } => write!(f, "Elem({}, {})", arg, start),
                UnaryOp::Extract { start, len } => {
                    write!(f, "Extract({}, {}, {})", arg, start, len)
                }
                UnaryOp::ExtractT { start, dim } => {
                    write!(f, "ExtractT({}, {}, {})", arg, start, dim)
                }
                UnaryOp::Broadcast(dim) => write!(f, "Broadcast({}, {})", arg, dim),
                _ => write!(f, "{}({})", op, arg),
            },
            Formula::Binary { op, lhs, rhs, .. } => match op.symbol() {
                Some(sym) => write!(f, "({} {} {})", lhs, sym, rhs),
                None if *op == BinaryOp::Scalprod => write!(f, "({} | {})", lhs, rhs),
                None => write!(f, "{}({}, {})", op, lhs, rhs),
            },
            Formula::Ternary { op, args, .. } => {
                write!(f, "{}({}, {}, {})", op.name(), args[0], args[1], args[2])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::variable::{Category, Variable};
    use crate::Formula;

    #[test]
    fn test_display_kernel() {
        let x = Formula::var(Variable::new("x", 0, Category::IndexedByI, 3));
        let y = Formula::var(Variable::new("y", 1, Category::IndexedByJ, 3));
        let f = Formula::exp(Formula::neg(Formula::sq_dist(x, y).unwrap()).unwrap()).unwrap();
        assert_eq!(f.to_string(), "Exp(Minus(SqDist(x, y)))");
    }

    #[test]
    fn test_display_infix_and_scalprod() {
        let x = Formula::var(Variable::new("x", 0, Category::IndexedByI, 3));
        let y = Formula::var(Variable::new("y", 1, Category::IndexedByJ, 3));
        let f = Formula::mul(
            Formula::constant(2.0),
            Formula::scalprod(x.clone(), y.clone()).unwrap(),
        )
        .unwrap();
        assert_eq!(f.to_string(), "(2 * (x | y))");

        let g = Formula::add(x, Formula::constant(-0.5)).unwrap();
        assert_eq!(g.to_string(), "(x + -0.5)");
    }

    #[test]
    fn test_non_finite_constants_read_back() {
        let aliases = crate::AliasTable::parse(&["x = Vx(1)"]).unwrap();
        let x = Formula::var(aliases.get("x").unwrap().clone());
        for c in [f64::INFINITY, f64::NEG_INFINITY] {
            let f = Formula::mul(x.clone(), Formula::constant(c)).unwrap();
            let back = crate::parse(&f.to_string(), &aliases).unwrap();
            assert_eq!(back, f);
        }
        let nan = Formula::constant(f64::NAN);
        assert_eq!(nan.to_string(), "NaN");
        match crate::parse("NaN", &aliases).unwrap() {
            Formula::Const(c) => assert!(c.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
