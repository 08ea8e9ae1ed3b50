//! Dense fallback: materialize the full `(M, N, D)` table, then reduce.
//!
//! Sequential and allocation heavy. Serves as the reference result and as the
//! strategy for small problems or hosts without the tiled executor.

use scirs2_core::ndarray::{Array2, Array3};

use super::ReductionBackend;
use crate::binding::Binding;
use crate::cache::CompiledPlan;
use crate::dispatch::BackendKind;
use crate::error::{ReductionError, ReductionResult};
use crate::program::Program;
use crate::accumulate::{shifted_exp, RowAccumulator};
use crate::reduction::ReductionOp;

#[derive(Debug, Clone, Copy, Default)]
pub struct DenseBackend;

/// Row-major `(M, N, D)` table of formula values.
fn table(program: &Program, binding: &Binding) -> Vec<f64> {
    let (m, n, d) = (binding.m(), binding.n(), program.dim());
    let mut values = Vec::with_capacity(m * n * d);
    let mut scratch = program.new_scratch();
    for i in 0..m {
        for j in 0..n {
            values.extend_from_slice(program.eval(binding, i, j, &mut scratch));
        }
    }
    values
}

/// Evaluate `program` on every pair and return the `(M, N, D)` array.
pub fn materialize(program: &Program, binding: &Binding) -> ReductionResult<Array3<f64>> {
    let shape = (binding.m(), binding.n(), program.dim());
    Array3::from_shape_vec(shape, table(program, binding))
        .map_err(|e| ReductionError::config(format!("pairwise table: {}", e)))
}

impl ReductionBackend for DenseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DenseFallback
    }

    fn reduce(&self, plan: &CompiledPlan, binding: &Binding, op: ReductionOp) -> Array2<f64> {
        let (m, n) = (binding.m(), binding.n());
        let d = plan.program.dim();
        let values = table(&plan.program, binding);
        let weights = plan.weights.as_ref().map(|w| (w.dim(), table(w, binding)));
        let out_dim = weights.as_ref().map_or(d, |(wd, _)| *wd);

        let mut out = Array2::zeros((m, out_dim));
        let mut row = vec![0.0; out_dim];
        for i in 0..m {
            let lane = &values[i * n * d..(i + 1) * n * d];
            match op {
                ReductionOp::LogSumExp => row[0] = log_sum_exp(lane),
                ReductionOp::SoftMax => {
                    let (wd, w) = weights.as_ref().map_or((0, &[][..]), |(wd, w)| (*wd, &w[..]));
                    softmax(lane, &w[i * n * wd..(i + 1) * n * wd], &mut row);
                }
                _ => {
                    let mut acc = RowAccumulator::new(op, out_dim);
                    for (j, v) in lane.chunks_exact(d).enumerate() {
                        acc.push(j, v, &[]);
                    }
                    acc.finish(&mut row);
                }
            }
            for (o, v) in out.row_mut(i).iter_mut().zip(&row) {
                *o = *v;
            }
        }
        out
    }
}

/// Two-pass log-sum-exp over a scalar lane.
fn log_sum_exp(lane: &[f64]) -> f64 {
    let max = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = lane.iter().map(|&k| shifted_exp(k, max)).sum();
    max + sum.ln()
}

/// Two-pass softmax-weighted average of `weights` (row-major, one row per `j`).
fn softmax(lane: &[f64], weights: &[f64], out: &mut [f64]) {
    let max = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let wd = out.len();
    out.fill(0.0);
    let mut denom = 0.0;
    for (j, &k) in lane.iter().enumerate() {
        if k == f64::NEG_INFINITY {
            continue;
        }
        let e = shifted_exp(k, max);
        denom += e;
        for (o, w) in out.iter_mut().zip(&weights[j * wd..(j + 1) * wd]) {
            *o += e * w;
        }
    }
    for o in out.iter_mut() {
        *o /= denom;
    }
}
