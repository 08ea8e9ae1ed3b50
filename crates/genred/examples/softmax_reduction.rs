//! SoftMax-weighted sum of `b_j` with logits `|x_i - y_j|^2`, compared with a
//! direct dense computation.
//!
//! Run with `--features structured-logging`; the `reduce` spans and plan
//! compilations are printed as they happen.

use anyhow::{Context, Result};
use scirs2_core::ndarray::Array2;
use scirs2_core::random::{Rng, SeedableRng, StdRng};
use std::time::Instant;
use tracing::Level;

use genred::logging::{LogFormat, TracingLogger};
use genred::{ArgTensor, Axis, Genred, ReductionOp};

const M: usize = 500;
const N: usize = 400;
const D: usize = 3;
const DV: usize = 2;

fn random(rows: usize, cols: usize, scale: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(0.0..scale))
}

fn dense_softmax(x: &Array2<f64>, y: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((x.nrows(), b.ncols()));
    for i in 0..x.nrows() {
        let logits: Vec<f64> = (0..y.nrows())
            .map(|j| (&x.row(i) - &y.row(j)).mapv(|v| v * v).sum())
            .collect();
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = logits.iter().map(|k| (k - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        let mut row = out.row_mut(i);
        for (j, w) in weights.iter().enumerate() {
            row.scaled_add(w / total, &b.row(j));
        }
    }
    out
}

fn main() -> Result<()> {
    TracingLogger::builder()
        .with_format(LogFormat::Compact)
        .with_engine_level(Level::DEBUG)
        .with_plan_cache(true)
        .with_reduction_timings(true)
        .build()?;

    let x = random(M, D, 4.0, 1);
    let y = random(N, D, 4.0, 2);
    let b = random(N, DV, 1.0, 3);

    let softmax = Genred::new(
        "SqDist(x,y)",
        &[
            format!("x = Vx({})", D),
            format!("y = Vy({})", D),
            format!("b = Vy({})", DV),
        ],
        ReductionOp::SoftMax,
        Axis::from_genred_axis(1)?,
    )
    .and_then(|op| op.with_formula2("b"))
    .context("building the SoftMax reduction")?;

    let args = [
        ArgTensor::from_f64(x.clone()),
        ArgTensor::from_f64(y.clone()),
        ArgTensor::from_f64(b.clone()),
    ];
    // Warm-up call fills the plan cache.
    softmax.call(&args)?;

    let start = Instant::now();
    let c = softmax.call(&args)?.to_f64();
    println!("genred:  {:.5}s", start.elapsed().as_secs_f64());

    let start = Instant::now();
    let reference = dense_softmax(&x, &y, &b);
    println!("dense:   {:.5}s", start.elapsed().as_secs_f64());

    let err = (&c - &reference).mapv(|v| v * v).sum().sqrt();
    let norm = reference.mapv(|v| v * v).sum().sqrt();
    let relative = err / norm;
    println!("relative error: {:.3e}", relative);
    anyhow::ensure!(relative < 1e-4, "relative error {} too large", relative);

    println!(
        "first rows:\n{}",
        c.slice(scirs2_core::ndarray::s![..3, ..])
    );
    let stats = softmax.engine().cache().stats();
    println!("plan cache: {}", stats.summary());
    Ok(())
}
