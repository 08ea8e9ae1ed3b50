//! Streaming tiled backends.
//!
//! Neither backend materializes the pairwise table. `Tiled1D` splits the
//! outer index into row blocks and streams every row over all of `j`.
//! `Tiled2D` also splits `j` into column blocks; the partial accumulators of
//! one row block are merged in ascending column-block order.

use scirs2_core::ndarray::Array2;
use std::ops::Range;
use tracing::trace;

use super::{assemble, blocks, map_ordered, ReductionBackend};
use crate::accumulate::RowAccumulator;
use crate::binding::Binding;
use crate::cache::CompiledPlan;
use crate::dispatch::BackendKind;
use crate::reduction::ReductionOp;

/// Accumulate rows `rows` over the reduced indices `cols`.
fn accumulate_tile(
    plan: &CompiledPlan,
    binding: &Binding,
    op: ReductionOp,
    rows: Range<usize>,
    cols: Range<usize>,
) -> Vec<RowAccumulator> {
    let out_dim = plan.output_dim();
    let mut scratch = plan.program.new_scratch();
    let mut scratch2 = plan
        .weights
        .as_ref()
        .map(|w| w.new_scratch())
        .unwrap_or_default();

    rows.map(|i| {
        let mut acc = RowAccumulator::new(op, out_dim);
        for j in cols.clone() {
            let value = plan.program.eval(binding, i, j, &mut scratch);
            let weight = match &plan.weights {
                Some(w) => w.eval(binding, i, j, &mut scratch2),
                None => &[],
            };
            acc.push(j, value, weight);
        }
        acc
    })
    .collect()
}

fn finish_rows(accs: &[RowAccumulator], dim: usize) -> Vec<f64> {
    let mut values = vec![0.0; accs.len() * dim];
    for (acc, out) in accs.iter().zip(values.chunks_exact_mut(dim)) {
        acc.finish(out);
    }
    values
}

/// Blocks over the outer index only.
#[derive(Debug, Clone, Copy)]
pub struct Tiled1D {
    pub block_rows: usize,
}

impl Tiled1D {
    pub fn new(block_rows: usize) -> Self {
        Self {
            block_rows: block_rows.max(1),
        }
    }
}

impl ReductionBackend for Tiled1D {
    fn kind(&self) -> BackendKind {
        BackendKind::Tiled1D
    }

    fn reduce(&self, plan: &CompiledPlan, binding: &Binding, op: ReductionOp) -> Array2<f64> {
        let (m, n) = (binding.m(), binding.n());
        let dim = plan.output_dim();
        let row_blocks = blocks(m, self.block_rows);
        trace!(blocks = row_blocks.len(), m, n, "tiled-1d reduction");

        let parts = map_ordered(&row_blocks, |rows| {
            let accs = accumulate_tile(plan, binding, op, rows.clone(), 0..n);
            (rows.clone(), finish_rows(&accs, dim))
        });
        assemble(m, dim, parts)
    }
}

/// Blocks over both indices.
#[derive(Debug, Clone, Copy)]
pub struct Tiled2D {
    pub block_rows: usize,
    pub block_cols: usize,
}

impl Tiled2D {
    pub fn new(block_rows: usize, block_cols: usize) -> Self {
        Self {
            block_rows: block_rows.max(1),
            block_cols: block_cols.max(1),
        }
    }
}

impl ReductionBackend for Tiled2D {
    fn kind(&self) -> BackendKind {
        BackendKind::Tiled2D
    }

    fn reduce(&self, plan: &CompiledPlan, binding: &Binding, op: ReductionOp) -> Array2<f64> {
        let (m, n) = (binding.m(), binding.n());
        let dim = plan.output_dim();
        let row_blocks = blocks(m, self.block_rows);
        let col_blocks = blocks(n, self.block_cols);
        trace!(
            row_blocks = row_blocks.len(),
            col_blocks = col_blocks.len(),
            "tiled-2d reduction"
        );

        let tiles: Vec<(usize, Range<usize>, Range<usize>)> = row_blocks
            .iter()
            .enumerate()
            .flat_map(|(rb, rows)| col_blocks.iter().map(move |cols| (rb, rows.clone(), cols.clone())))
            .collect();
        let partials = map_ordered(&tiles, |(_, rows, cols)| {
            accumulate_tile(plan, binding, op, rows.clone(), cols.clone())
        });

        // Tiles are ordered row-block major, column-block minor.
        let mut merged: Vec<Vec<RowAccumulator>> = row_blocks
            .iter()
            .map(|rows| rows.clone().map(|_| RowAccumulator::new(op, dim)).collect())
            .collect();
        for ((rb, _, _), partial) in tiles.iter().zip(&partials) {
            for (acc, next) in merged[*rb].iter_mut().zip(partial) {
                acc.merge(next);
            }
        }

        let parts = row_blocks
            .into_iter()
            .zip(&merged)
            .map(|(rows, accs)| (rows, finish_rows(accs, dim)))
            .collect();
        assemble(m, dim, parts)
    }
}
