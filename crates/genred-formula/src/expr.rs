//! Formula expression trees.
//!
//! A [`Formula`] is an immutable tree whose inner nodes carry their inferred
//! output dimension. All constructors check operand dimensions, so a value of
//! type `Formula` always typechecks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::FormulaResult;
use crate::ops::{BinaryOp, TernaryOp, UnaryOp};
use crate::variable::{Category, Variable};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Formula {
    Var(Variable),
    /// Scalar constant
    Const(f64),
    /// Zero vector of the given dimension
    Zero(usize),
    Unary {
        op: UnaryOp,
        arg: Box<Formula>,
        dim: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Formula>,
        rhs: Box<Formula>,
        dim: usize,
    },
    Ternary {
        op: TernaryOp,
        args: Box<[Formula; 3]>,
        dim: usize,
    },
}

impl Formula {
    pub fn var(var: Variable) -> Self {
        Formula::Var(var)
    }

    pub fn constant(value: f64) -> Self {
        Formula::Const(value)
    }

    pub fn int_cst(value: i64) -> Self {
        Formula::Const(value as f64)
    }

    pub fn zero(dim: usize) -> Self {
        Formula::Zero(dim)
    }

    pub fn unary(op: UnaryOp, arg: Formula) -> FormulaResult<Self> {
        let dim = op.output_dim(arg.dim())?;
        Ok(Formula::Unary {
            op,
            arg: Box::new(arg),
            dim,
        })
    }

    pub fn binary(op: BinaryOp, lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        let dim = op.output_dim(lhs.dim(), rhs.dim())?;
        Ok(Formula::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            dim,
        })
    }

    pub fn ternary(op: TernaryOp, a: Formula, b: Formula, c: Formula) -> FormulaResult<Self> {
        let dim = op.output_dim(a.dim(), b.dim(), c.dim())?;
        Ok(Formula::Ternary {
            op,
            args: Box::new([a, b, c]),
            dim,
        })
    }

    // Arithmetic shorthands.

    pub fn add(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::Div, lhs, rhs)
    }

    pub fn neg(arg: Formula) -> FormulaResult<Self> {
        Self::unary(UnaryOp::Minus, arg)
    }

    pub fn square(arg: Formula) -> FormulaResult<Self> {
        Self::unary(UnaryOp::Square, arg)
    }

    pub fn exp(arg: Formula) -> FormulaResult<Self> {
        Self::unary(UnaryOp::Exp, arg)
    }

    pub fn sq_dist(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::SqDist, lhs, rhs)
    }

    pub fn scalprod(lhs: Formula, rhs: Formula) -> FormulaResult<Self> {
        Self::binary(BinaryOp::Scalprod, lhs, rhs)
    }

    pub fn sum(arg: Formula) -> FormulaResult<Self> {
        Self::unary(UnaryOp::Sum, arg)
    }

    pub fn if_else(cond: Formula, then: Formula, otherwise: Formula) -> FormulaResult<Self> {
        Self::ternary(TernaryOp::IfElse, cond, then, otherwise)
    }

    /// Output dimension of this node.
    pub fn dim(&self) -> usize {
        match self {
            Formula::Var(v) => v.dim,
            Formula::Const(_) => 1,
            Formula::Zero(dim) => *dim,
            Formula::Unary { dim, .. }
            | Formula::Binary { dim, .. }
            | Formula::Ternary { dim, .. } => *dim,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Formula::Zero(_)) || matches!(self, Formula::Const(c) if *c == 0.0)
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Formula::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Formula> {
        match self {
            Formula::Var(_) | Formula::Const(_) | Formula::Zero(_) => Vec::new(),
            Formula::Unary { arg, .. } => vec![arg.as_ref()],
            Formula::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Formula::Ternary { args, .. } => args.iter().collect(),
        }
    }

    /// Distinct variables referenced by the formula, ordered by position.
    pub fn variables(&self) -> Vec<Variable> {
        let mut found = BTreeMap::new();
        self.collect_variables(&mut found);
        found.into_values().collect()
    }

    fn collect_variables(&self, found: &mut BTreeMap<usize, Variable>) {
        if let Formula::Var(v) = self {
            found.entry(v.position).or_insert_with(|| v.clone());
        }
        for child in self.children() {
            child.collect_variables(found);
        }
    }

    pub fn depends_on(&self, var: &Variable) -> bool {
        match self {
            Formula::Var(v) => v.same_slot(var),
            _ => self.children().iter().any(|c| c.depends_on(var)),
        }
    }

    /// Whether any leaf is indexed by the given category.
    pub fn uses_category(&self, category: Category) -> bool {
        match self {
            Formula::Var(v) => v.category == category,
            _ => self.children().iter().any(|c| c.uses_category(category)),
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Rebuild the tree with every variable passed through `f`.
    ///
    /// `f` must preserve variable dimensions.
    pub fn map_variables(&self, f: &impl Fn(&Variable) -> Variable) -> Formula {
        match self {
            Formula::Var(v) => Formula::Var(f(v)),
            Formula::Const(_) | Formula::Zero(_) => self.clone(),
            Formula::Unary { op, arg, dim } => Formula::Unary {
                op: *op,
                arg: Box::new(arg.map_variables(f)),
                dim: *dim,
            },
            Formula::Binary { op, lhs, rhs, dim } => Formula::Binary {
                op: *op,
                lhs: Box::new(lhs.map_variables(f)),
                rhs: Box::new(rhs.map_variables(f)),
                dim: *dim,
            },
            Formula::Ternary { op, args, dim } => Formula::Ternary {
                op: *op,
                args: Box::new([
                    args[0].map_variables(f),
                    args[1].map_variables(f),
                    args[2].map_variables(f),
                ]),
                dim: *dim,
            },
        }
    }

    /// The same formula with the roles of `i` and `j` exchanged.
    pub fn transposed(&self) -> Formula {
        self.map_variables(&|v| Variable {
            category: v.category.transposed(),
            ..v.clone()
        })
    }

    /// Canonical text that identifies the formula independently of variable
    /// names. Used as a cache key.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Formula::Var(v) => {
                let _ = write!(out, "{}({},{})", v.category.tag(), v.position, v.dim);
            }
            Formula::Const(c) => {
                let _ = write!(out, "C[{:x}]", c.to_bits());
            }
            Formula::Zero(d) => {
                let _ = write!(out, "Z[{}]", d);
            }
            Formula::Unary { op, arg, .. } => {
                let _ = write!(out, "{:?}(", op);
                arg.write_signature(out);
                out.push(')');
            }
            Formula::Binary { op, lhs, rhs, .. } => {
                let _ = write!(out, "{:?}(", op);
                lhs.write_signature(out);
                out.push(',');
                rhs.write_signature(out);
                out.push(')');
            }
            Formula::Ternary { op, args, .. } => {
                let _ = write!(out, "{:?}(", op);
                for (k, a) in args.iter().enumerate() {
                    if k > 0 {
                        out.push(',');
                    }
                    a.write_signature(out);
                }
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Formula {
        Formula::var(Variable::new("x", 0, Category::IndexedByI, 3))
    }

    fn y() -> Formula {
        Formula::var(Variable::new("y", 1, Category::IndexedByJ, 3))
    }

    fn b() -> Formula {
        Formula::var(Variable::new("b", 2, Category::IndexedByJ, 2))
    }

    #[test]
    fn test_dimension_inference() {
        let f = Formula::sq_dist(x(), y()).unwrap();
        assert_eq!(f.dim(), 1);

        let g = Formula::mul(Formula::exp(Formula::neg(f).unwrap()).unwrap(), b()).unwrap();
        assert_eq!(g.dim(), 2);
    }

    #[test]
    fn test_dimension_errors() {
        assert!(Formula::add(x(), b()).is_err());
        assert!(Formula::sq_dist(x(), b()).is_err());
    }

    #[test]
    fn test_variables_sorted_and_unique() {
        let f = Formula::add(Formula::sub(x(), y()).unwrap(), x()).unwrap();
        let vars = f.variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "x");
        assert_eq!(vars[1].name, "y");
        assert!(f.depends_on(&Variable::new("x", 0, Category::IndexedByI, 3)));
        assert!(!f.depends_on(&Variable::new("b", 2, Category::IndexedByJ, 2)));
    }

    #[test]
    fn test_transposed_swaps_categories() {
        let f = Formula::sq_dist(x(), y()).unwrap();
        let t = f.transposed();
        assert!(t.uses_category(Category::IndexedByJ));
        let vars = t.variables();
        assert_eq!(vars[0].category, Category::IndexedByJ);
        assert_eq!(vars[1].category, Category::IndexedByI);
    }

    #[test]
    fn test_signature_ignores_names() {
        let f = Formula::sq_dist(x(), y()).unwrap();
        let renamed = f.map_variables(&|v| Variable {
            name: format!("{}_renamed", v.name),
            ..v.clone()
        });
        assert_eq!(f.signature(), renamed.signature());
        assert_ne!(f.signature(), f.transposed().signature());
    }

    #[test]
    fn test_node_count_and_depth() {
        let f = Formula::exp(Formula::sq_dist(x(), y()).unwrap()).unwrap();
        assert_eq!(f.node_count(), 4);
        assert_eq!(f.depth(), 3);
    }
}
