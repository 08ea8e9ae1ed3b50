#![allow(dead_code)]

use genred::BackendMode;
use scirs2_core::ndarray::Array2;
use scirs2_core::random::{Rng, SeedableRng, StdRng};

/// Seeded values uniform in `[lo, hi)`.
pub fn uniform(rows: usize, cols: usize, lo: f64, hi: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(lo..hi))
}

/// Every backend mode this build can run.
pub fn backends() -> Vec<BackendMode> {
    let mut modes = vec![BackendMode::Auto, BackendMode::DenseFallback];
    if cfg!(feature = "parallel") {
        modes.extend([BackendMode::Tiled1D, BackendMode::Tiled2D, BackendMode::Accelerated]);
    }
    modes
}

/// `|a - b| <= atol + rtol * |b|` elementwise.
pub fn allclose(a: &Array2<f64>, b: &Array2<f64>, rtol: f64, atol: f64) -> bool {
    a.dim() == b.dim()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

pub fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(u, v)| (u - v) * (u - v)).sum()
}

/// Stabilized dense SoftMax-weighted sum with `K = SqDist(x, y)`.
pub fn softmax_reference(x: &Array2<f64>, y: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let (m, n, e) = (x.nrows(), y.nrows(), b.ncols());
    let mut out = Array2::zeros((m, e));
    for i in 0..m {
        let logits: Vec<f64> = (0..n)
            .map(|j| sq_dist(&x.row(i).to_vec(), &y.row(j).to_vec()))
            .collect();
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = logits.iter().map(|k| (k - max).exp()).collect();
        let denom: f64 = weights.iter().sum();
        for j in 0..n {
            for c in 0..e {
                out[[i, c]] += weights[j] * b[[j, c]] / denom;
            }
        }
    }
    out
}
