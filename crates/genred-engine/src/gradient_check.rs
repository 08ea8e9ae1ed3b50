//! Numeric gradient checking for reduction gradients.
//!
//! Compares the gradients produced by [`ReductionEngine::backward`] with
//! central finite differences of the scalar loss `sum(upstream * output)`.
//! Forward passes run on the dense backend, whose accumulation order does not
//! depend on tile sizes.

use scirs2_core::ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::Binding;
use crate::dispatch::BackendMode;
use crate::engine::{ReductionCall, ReductionEngine};
use crate::error::{ReductionError, ReductionResult};

/// Configuration for gradient checking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientCheckConfig {
    /// Step for central differences
    pub epsilon: f64,
    /// Relative tolerance for gradient comparison
    pub rtol: f64,
    /// Absolute tolerance for gradient comparison
    pub atol: f64,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        GradientCheckConfig {
            epsilon: 1e-6,
            rtol: 1e-4,
            atol: 1e-6,
        }
    }
}

/// Result of gradient checking for a single argument
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCheckResult {
    pub name: String,
    pub position: usize,
    pub max_abs_diff: f64,
    pub max_rel_diff: f64,
    pub passed: bool,
    pub num_elements: usize,
}

fn loss(forward: &Array2<f64>, upstream: &Array2<f64>) -> f64 {
    forward.iter().zip(upstream.iter()).map(|(a, b)| a * b).sum()
}

/// Central-difference gradient of `sum(upstream * call(binding))` with
/// respect to the argument at `position`.
pub fn numeric_gradient(
    engine: &ReductionEngine,
    call: &ReductionCall,
    binding: &Binding,
    upstream: &Array2<f64>,
    position: usize,
    config: &GradientCheckConfig,
) -> ReductionResult<Array2<f64>> {
    let arg = binding.get(position).ok_or_else(|| {
        ReductionError::shape_mismatch(format!("#{}", position), (None, None), (0, 0))
    })?;
    let dense = call.clone().with_backend(BackendMode::DenseFallback);
    let base = arg.values().to_vec();
    let mut grad = Vec::with_capacity(base.len());

    for k in 0..base.len() {
        let mut plus = base.clone();
        plus[k] += config.epsilon;
        let mut minus = base.clone();
        minus[k] -= config.epsilon;

        let up = engine.call(&dense, &binding.with_values(position, plus)?)?;
        let down = engine.call(&dense, &binding.with_values(position, minus)?)?;
        grad.push((loss(&up, upstream) - loss(&down, upstream)) / (2.0 * config.epsilon));
    }

    Array2::from_shape_vec((arg.rows(), arg.var.dim), grad)
        .map_err(|e| ReductionError::config(format!("numeric gradient: {}", e)))
}

/// Compare analytical and numeric gradients
pub fn compare_gradients(
    analytical: &Array2<f64>,
    numeric: &Array2<f64>,
    name: &str,
    position: usize,
    config: &GradientCheckConfig,
) -> GradientCheckResult {
    let mut max_abs_diff: f64 = 0.0;
    let mut max_rel_diff: f64 = 0.0;
    let mut passed = analytical.dim() == numeric.dim();

    for (a, n) in analytical.iter().zip(numeric.iter()) {
        let abs_diff = (a - n).abs();
        let rel_diff = if n.abs() > 1e-10 {
            abs_diff / n.abs()
        } else {
            abs_diff
        };
        max_abs_diff = max_abs_diff.max(abs_diff);
        max_rel_diff = max_rel_diff.max(rel_diff);
        passed &= abs_diff <= config.atol + config.rtol * n.abs();
    }

    GradientCheckResult {
        name: name.to_string(),
        position,
        max_abs_diff,
        max_rel_diff,
        passed,
        num_elements: analytical.len(),
    }
}

/// Check the gradients of every argument at `positions`.
pub fn check_gradients(
    engine: &ReductionEngine,
    call: &ReductionCall,
    binding: &Binding,
    upstream: &Array2<f64>,
    positions: &[usize],
    config: Option<GradientCheckConfig>,
) -> ReductionResult<Vec<GradientCheckResult>> {
    let config = config.unwrap_or(engine.config().gradient_check);
    let output = engine.call(call, binding)?;
    let analytical = engine.backward(call, binding, &output, upstream, positions)?;

    let mut results = Vec::with_capacity(positions.len());
    for &position in positions {
        let numeric = numeric_gradient(engine, call, binding, upstream, position, &config)?;
        let name = binding
            .get(position)
            .map_or_else(|| format!("#{}", position), |a| a.var.name.clone());
        if let Some(grad) = analytical.get(&position) {
            let result = compare_gradients(grad, &numeric, &name, position, &config);
            debug!(
                argument = %result.name,
                max_abs_diff = result.max_abs_diff,
                passed = result.passed,
                "gradient check"
            );
            results.push(result);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduction::{Axis, ReductionDescriptor, ReductionOp};
    use crate::tensor::ArgTensor;
    use genred_formula::{parse, AliasTable};
    use scirs2_core::ndarray::array;

    #[test]
    fn test_compare_identical() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let result = compare_gradients(&a, &a, "x", 0, &GradientCheckConfig::default());
        assert!(result.passed);
        assert_eq!(result.max_abs_diff, 0.0);
        assert_eq!(result.num_elements, 4);
    }

    #[test]
    fn test_compare_detects_mismatch() {
        let a = array![[1.0, 2.0]];
        let b = array![[1.0, 2.5]];
        let result = compare_gradients(&a, &b, "x", 0, &GradientCheckConfig::default());
        assert!(!result.passed);
        assert!((result.max_abs_diff - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_lse_gradients() {
        let aliases = AliasTable::parse(&["x = Vx(2)", "y = Vy(2)", "g = Pm(1)"]).unwrap();
        let binding = Binding::bind(
            &aliases,
            &[
                ArgTensor::from_f64(array![[0.1, 0.2], [-0.3, 0.5], [1.0, -1.0]]),
                ArgTensor::from_f64(array![[0.0, 0.4], [0.7, -0.2]]),
                ArgTensor::from_f64(array![[0.8]]),
            ],
        )
        .unwrap();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("-g * SqDist(x, y)", &aliases).unwrap(),
            ReductionDescriptor::new(ReductionOp::LogSumExp, Axis::ReduceOverJ),
        );
        let upstream = array![[1.0], [0.5], [-2.0]];
        let results = check_gradients(&engine, &call, &binding, &upstream, &[0, 1, 2], None).unwrap();
        assert_eq!(results.len(), 3);
        for r in &results {
            assert!(r.passed, "{:?}", r);
        }
    }
}
