//! Execution backends.
//!
//! Every backend reduces over `j` and returns an `(M, Dout)` array; the
//! engine transposes the binding beforehand when the reduction runs over `i`.
//! Each backend visits the reduced index in a fixed order and merges partial
//! results in a fixed order, so repeated calls are bit-identical whatever the
//! number of worker threads.

mod dense;
mod tiled;

pub use dense::{materialize, DenseBackend};
pub use tiled::{Tiled1D, Tiled2D};

use scirs2_core::ndarray::Array2;
use std::ops::Range;

use crate::binding::Binding;
use crate::cache::CompiledPlan;
use crate::dispatch::BackendKind;
use crate::reduction::ReductionOp;

/// A concrete execution strategy.
pub trait ReductionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Reduce the plan over `j` for every `i`.
    ///
    /// The plan must have been checked against the binding and the reduction
    /// validated against the plan's dimensions.
    fn reduce(&self, plan: &CompiledPlan, binding: &Binding, op: ReductionOp) -> Array2<f64>;
}

/// Split `0..len` into consecutive blocks of at most `size` indices.
pub(crate) fn blocks(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Map over `items`, in parallel when available, preserving order.
#[cfg(feature = "parallel")]
pub(crate) fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    use rayon::prelude::*;
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn map_ordered<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    items.iter().map(f).collect()
}

/// Assemble per-block row-major outputs into one `(rows, dim)` array.
pub(crate) fn assemble(rows: usize, dim: usize, parts: Vec<(Range<usize>, Vec<f64>)>) -> Array2<f64> {
    let mut out = Array2::zeros((rows, dim));
    for (range, values) in parts {
        for (k, i) in range.enumerate() {
            for (o, v) in out.row_mut(i).iter_mut().zip(&values[k * dim..(k + 1) * dim]) {
                *o = *v;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks() {
        assert_eq!(blocks(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(blocks(3, 0), vec![0..1, 1..2, 2..3]);
        assert!(blocks(0, 8).is_empty());
    }

    #[test]
    fn test_map_ordered_keeps_order() {
        let items: Vec<usize> = (0..100).collect();
        let out = map_ordered(&items, |x| x * 2);
        assert_eq!(out, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_assemble() {
        let out = assemble(3, 2, vec![(0..2, vec![1.0, 2.0, 3.0, 4.0]), (2..3, vec![5.0, 6.0])]);
        assert_eq!(out[[2, 1]], 6.0);
        assert_eq!(out[[1, 0]], 3.0);
    }
}
