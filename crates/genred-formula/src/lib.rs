//! # genred-formula
//!
//! Symbolic formulas for generic reductions.
//!
//! A formula is evaluated pointwise on pairs `(i, j)` of rows taken from
//! indexed vector collections, then reduced along one index by the engine.
//! This crate is pure: it builds, typechecks, prints, simplifies and
//! differentiates formulas but never touches data.
//!
//! ## Core components
//!
//! - [`Variable`] and [`AliasTable`]: argument slots declared as
//!   `x = Vx(3)`, `y = Vy(3)` or `p = Pm(0, 1)`.
//! - [`Formula`]: an immutable, dimension-checked expression tree over the
//!   closed operator set [`UnaryOp`], [`BinaryOp`] and [`TernaryOp`].
//! - [`parse`]: the operator-call syntax (`Exp(-SqDist(x, y)) * b`).
//! - [`Formula::grad`]: exact vector-Jacobian products.
//! - [`simplify()`]: constant folding and zero/unit elimination.
//!
//! ## Example
//!
//! ```
//! use genred_formula::{parse, AliasTable};
//!
//! let aliases =
//!     AliasTable::parse(&["x = Vx(3)", "y = Vy(3)", "b = Vy(2)", "e = Vx(2)"]).unwrap();
//! let f = parse("Exp(-SqDist(x, y)) * b", &aliases).unwrap();
//! assert_eq!(f.dim(), 2);
//!
//! // Vector-Jacobian product against `e`, one row per `i`.
//! let e = parse("e", &aliases).unwrap();
//! let g = f.grad(aliases.get("x").unwrap(), &e).unwrap();
//! assert_eq!(g.dim(), 3);
//! ```

mod diff;
mod display;
pub mod error;
pub mod expr;
pub mod ops;
pub mod parser;
pub mod simplify;
pub mod variable;

pub use error::{FormulaError, FormulaResult};
pub use expr::Formula;
pub use ops::{BinaryOp, TernaryOp, UnaryOp};
pub use parser::{parse, parse_with_aliases};
pub use simplify::simplify;
pub use variable::{parse_alias, AliasTable, Category, Variable};
