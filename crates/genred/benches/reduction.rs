//! Benchmarks for reductions across backends and problem sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scirs2_core::ndarray::Array2;
use scirs2_core::random::{Rng, SeedableRng, StdRng};
use std::hint::black_box;

use genred::{ArgTensor, Axis, BackendMode, Genred, ReductionOp};

fn points(rows: usize, cols: usize, seed: u64) -> ArgTensor {
    let mut rng = StdRng::seed_from_u64(seed);
    ArgTensor::from_f64(Array2::from_shape_fn((rows, cols), |_| rng.random_range(0.0..1.0)))
}

fn bench_gaussian_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_sum");
    for &size in &[256usize, 1024, 4096] {
        let args = [points(size, 3, 1), points(size, 3, 2), points(size, 2, 3)];
        group.throughput(Throughput::Elements((size * size) as u64));
        for backend in [
            BackendMode::DenseFallback,
            BackendMode::Tiled1D,
            BackendMode::Tiled2D,
        ] {
            let op = Genred::new(
                "Exp(-SqDist(x,y)) * b",
                &["x = Vx(3)", "y = Vy(3)", "b = Vy(2)"],
                ReductionOp::Sum,
                Axis::ReduceOverJ,
            )
            .unwrap()
            .with_backend(backend);
            group.bench_with_input(BenchmarkId::new(backend.name(), size), &args, |b, args| {
                b.iter(|| black_box(op.call(black_box(args)).unwrap()))
            });
        }
    }
    group.finish();
}

fn bench_softmax(c: &mut Criterion) {
    let mut group = c.benchmark_group("softmax");
    let args = [points(500, 3, 4), points(400, 3, 5), points(400, 2, 6)];
    let op = Genred::new(
        "SqDist(x,y)",
        &["x = Vx(3)", "y = Vy(3)", "b = Vy(2)"],
        ReductionOp::SoftMax,
        Axis::ReduceOverJ,
    )
    .unwrap()
    .with_formula2("b")
    .unwrap();
    group.bench_function("500x400", |b| b.iter(|| black_box(op.call(&args).unwrap())));
    group.finish();
}

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradient");
    let args = [points(512, 3, 7), points(512, 3, 8), points(512, 1, 9)];
    let upstream = points(512, 1, 10);
    let op = Genred::new(
        "-SqDist(x,y) + b",
        &["x = Vx(3)", "y = Vy(3)", "b = Vy(1)"],
        ReductionOp::LogSumExp,
        Axis::ReduceOverJ,
    )
    .unwrap();
    group.bench_function("lse_wrt_x", |b| {
        b.iter(|| black_box(op.gradient(&args, &upstream, &["x"]).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_gaussian_sum, bench_softmax, bench_gradient);
criterion_main!(benches);
