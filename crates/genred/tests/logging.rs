//! The structured logger installs once and the engine reports through it.
#![cfg(feature = "structured-logging")]

use genred::logging::{LogFormat, TracingLogger};
use genred::{reduce, ArgTensor, Axis, BackendMode, ReductionError, ReductionOp};
use scirs2_core::ndarray::array;
use tracing::Level;

#[test]
fn test_logger_installs_once_and_reductions_run_under_it() {
    let logger = TracingLogger::builder()
        .with_format(LogFormat::Json)
        .with_engine_level(Level::TRACE)
        .with_plan_cache(true)
        .with_tiles(true)
        .with_reduction_timings(true)
        .build()
        .unwrap();
    assert_eq!(logger.format(), LogFormat::Json);

    let out = reduce(
        "SqDist(x,y)",
        &["x = Vx(1)", "y = Vy(1)"],
        ReductionOp::Min,
        Axis::ReduceOverJ,
        BackendMode::Auto,
        None,
        &[
            ArgTensor::from_f64(array![[0.0], [2.0]]),
            ArgTensor::from_f64(array![[1.0], [5.0]]),
        ],
    )
    .unwrap();
    assert_eq!(out.to_f64(), array![[1.0], [1.0]]);

    let again = TracingLogger::builder().build().unwrap_err();
    assert!(matches!(again, ReductionError::Config(_)));
}
