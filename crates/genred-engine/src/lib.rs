//! Reduction engine for generic symbolic reductions.
//!
//! Given a [`genred_formula::Formula`] over variables indexed by `i`, by `j`
//! or by neither, the engine evaluates `F(i, j)` for every pair and reduces
//! over one of the two indices without materializing the `M x N` table:
//!
//! ```text
//! out[i] = R_j F(p, x_i, y_j)          (Axis::ReduceOverJ)
//! out[j] = R_i F(p, x_i, y_j)          (Axis::ReduceOverI)
//! ```
//!
//! # Layers
//!
//! - [`binding`]: validated association of arguments to variables
//! - [`program`]: formulas compiled to register programs
//! - [`accumulate`]: per-row accumulators for every [`ReductionOp`]
//! - [`backend`]: dense, row-tiled and 2-D tiled execution strategies
//! - [`dispatch`]: backend selection from the call and the host capabilities
//! - [`cache`]: compiled plans shared between calls
//! - [`autodiff`]: gradients of reductions as further reductions
//!
//! # Example
//!
//! ```
//! use genred_engine::{ArgTensor, Axis, Binding, ReductionCall, ReductionDescriptor, ReductionEngine};
//! use genred_formula::{parse, AliasTable};
//! use scirs2_core::ndarray::array;
//!
//! let aliases = AliasTable::parse(&["x = Vx(1)", "y = Vy(1)"]).unwrap();
//! let binding = Binding::bind(
//!     &aliases,
//!     &[
//!         ArgTensor::from_f64(array![[1.0], [2.0]]),
//!         ArgTensor::from_f64(array![[3.0], [4.0], [5.0]]),
//!     ],
//! )
//! .unwrap();
//!
//! let engine = ReductionEngine::default();
//! let call = ReductionCall::new(
//!     parse("x * y", &aliases).unwrap(),
//!     ReductionDescriptor::sum(Axis::ReduceOverJ),
//! );
//! let out = engine.call(&call, &binding).unwrap();
//! assert_eq!(out, array![[12.0], [24.0]]);
//! ```

pub mod accumulate;
pub mod autodiff;
pub mod backend;
pub mod binding;
pub mod cache;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gradient_check;
pub mod program;
pub mod reduction;
pub mod tensor;

pub use accumulate::RowAccumulator;
pub use backend::{materialize, DenseBackend, ReductionBackend, Tiled1D, Tiled2D};
pub use binding::{Binding, BoundArg};
pub use cache::{CacheStats, CompiledPlan, PlanCache, PlanKey};
pub use config::EngineConfig;
pub use device::{Device, DeviceCapability};
pub use dispatch::{negotiate, select, BackendKind, BackendMode, Negotiated, TileSizes};
pub use engine::{ExecutionPlan, ReductionCall, ReductionEngine};
pub use error::{
    BackendUnavailableError, DimensionError, ReductionError, ReductionResult, ShapeMismatchError,
};
pub use gradient_check::{
    check_gradients, compare_gradients, numeric_gradient, GradientCheckConfig, GradientCheckResult,
};
pub use program::Program;
pub use reduction::{Axis, ReductionDescriptor, ReductionOp};
pub use tensor::{ArgTensor, Precision, Residency};
