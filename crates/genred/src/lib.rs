//! Generic symbolic reductions.
//!
//! `genred` evaluates a formula `F(p, x_i, y_j)` over every pair of an
//! `i`-indexed and a `j`-indexed point cloud and reduces the result over one
//! of the two indices, without ever storing the `M x N` table:
//!
//! ```text
//! out_i = Reduction_j F(p, x_i, y_j)
//! ```
//!
//! Formulas are written in the operator-call syntax (`SqDist(x,y)`,
//! `Exp(-g*SqDist(x,y))*b`, `Grad(F,x,e)`) against alias declarations such as
//! `x = Vx(3)` (indexed by `i`), `y = Vy(3)` (indexed by `j`) and `g = Pm(1)`
//! (a parameter).
//!
//! # Entry points
//!
//! - [`reduce`]: one-shot call
//! - [`Genred`]: a parsed, reusable reduction with gradients
//! - [`generic_sum`]: sum reduction with the legacy `(dim, category)` signature
//! - [`kernel_product`]: radial kernel convolutions
//!
//! # Example
//!
//! ```
//! use genred::{reduce, ArgTensor, Axis, BackendMode, ReductionOp};
//! use scirs2_core::ndarray::array;
//!
//! let x = ArgTensor::from_f64(array![[0.0], [1.0]]);
//! let y = ArgTensor::from_f64(array![[0.0], [1.0], [3.0]]);
//! let nearest = reduce(
//!     "SqDist(x,y)",
//!     &["x = Vx(1)", "y = Vy(1)"],
//!     ReductionOp::ArgMin,
//!     Axis::ReduceOverJ,
//!     BackendMode::Auto,
//!     None,
//!     &[x, y],
//! )
//! .unwrap();
//! assert_eq!(nearest.to_f64(), array![[0.0], [1.0]]);
//! ```

pub mod generic;
pub mod kernels;
#[cfg(feature = "structured-logging")]
pub mod logging;
pub mod operator;

pub use genred_engine as engine;
pub use genred_formula as formula;

pub use generic::generic_sum;
pub use genred_engine::{
    ArgTensor, Axis, BackendMode, Device, EngineConfig, Precision, ReductionDescriptor,
    ReductionEngine, ReductionError, ReductionOp, ReductionResult, Residency,
};
pub use genred_formula::{AliasTable, Formula, FormulaError};
pub use kernels::{kernel_product, KernelKind, KernelMode};
pub use operator::Genred;

/// Parse, bind and reduce in one call.
///
/// Builds a fresh engine, so nothing is cached between calls; keep a
/// [`Genred`] around to reuse compiled plans.
pub fn reduce<S: AsRef<str>>(
    formula: &str,
    aliases: &[S],
    reduction_op: ReductionOp,
    axis: Axis,
    backend: BackendMode,
    formula2: Option<&str>,
    args: &[ArgTensor],
) -> ReductionResult<ArgTensor> {
    let mut op = Genred::new(formula, aliases, reduction_op, axis)?.with_backend(backend);
    if let Some(weights) = formula2 {
        op = op.with_formula2(weights)?;
    }
    op.call(args)
}
