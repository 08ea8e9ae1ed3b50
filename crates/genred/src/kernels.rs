//! Radial kernel convolutions.
//!
//! `kernel_product` computes, for every `i`,
//!
//! ```text
//! Sum mode:  out_i = sum_j k(x_i, y_j) b_j
//! Lse mode:  out_i = log sum_j exp(log k(x_i, y_j) + b_j)
//! ```
//!
//! with `k` one of the radial kernels below, evaluated at `r2 = gamma |x - y|^2`:
//!
//! | kernel                 | `k(r2)`              |
//! |------------------------|----------------------|
//! | `gaussian`             | `exp(-r2)`           |
//! | `laplacian`            | `exp(-sqrt(r2))`     |
//! | `cauchy`               | `1 / (1 + r2)`       |
//! | `inverse_multiquadric` | `1 / sqrt(1 + r2)`   |

use scirs2_core::ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use genred_engine::{
    ArgTensor, Axis, BackendMode, ReductionError, ReductionOp, ReductionResult,
};
use genred_formula::FormulaError;

use crate::operator::Genred;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    Gaussian,
    Laplacian,
    Cauchy,
    InverseMultiquadric,
}

impl KernelKind {
    pub const ALL: [KernelKind; 4] = [
        KernelKind::Gaussian,
        KernelKind::Laplacian,
        KernelKind::Cauchy,
        KernelKind::InverseMultiquadric,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::Gaussian => "gaussian",
            KernelKind::Laplacian => "laplacian",
            KernelKind::Cauchy => "cauchy",
            KernelKind::InverseMultiquadric => "inverse_multiquadric",
        }
    }

    /// `k(x, y)` in formula syntax, with `g` the bandwidth parameter.
    pub fn formula(&self) -> &'static str {
        match self {
            KernelKind::Gaussian => "Exp(-g * SqDist(x,y))",
            KernelKind::Laplacian => "Exp(-Sqrt(g * SqDist(x,y)))",
            KernelKind::Cauchy => "Inv(1 + g * SqDist(x,y))",
            KernelKind::InverseMultiquadric => "Rsqrt(1 + g * SqDist(x,y))",
        }
    }

    /// `log k(x, y)` in formula syntax.
    pub fn log_formula(&self) -> &'static str {
        match self {
            KernelKind::Gaussian => "-g * SqDist(x,y)",
            KernelKind::Laplacian => "-Sqrt(g * SqDist(x,y))",
            KernelKind::Cauchy => "-Log(1 + g * SqDist(x,y))",
            KernelKind::InverseMultiquadric => "-0.5 * Log(1 + g * SqDist(x,y))",
        }
    }

    /// Kernel value at a squared distance.
    pub fn evaluate(&self, gamma: f64, sq_dist: f64) -> f64 {
        let r2 = gamma * sq_dist;
        match self {
            KernelKind::Gaussian => (-r2).exp(),
            KernelKind::Laplacian => (-r2.sqrt()).exp(),
            KernelKind::Cauchy => 1.0 / (1.0 + r2),
            KernelKind::InverseMultiquadric => 1.0 / (1.0 + r2).sqrt(),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for KernelKind {
    type Err = FormulaError;

    /// Accepts the bare name or the call form `gaussian(x,y)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.split('(').next().unwrap_or(s).trim();
        KernelKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| FormulaError::UnknownOperator {
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelMode {
    #[default]
    Sum,
    Lse,
}

impl FromStr for KernelMode {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(KernelMode::Sum),
            "lse" | "log_sum_exp" => Ok(KernelMode::Lse),
            _ => Err(FormulaError::UnknownOperator {
                name: s.to_string(),
            }),
        }
    }
}

/// The reduction computing `kernel_product` for points of dimension `dim`
/// and signals of dimension `signal_dim`.
pub fn kernel_operator(
    kernel: KernelKind,
    mode: KernelMode,
    dim: usize,
    signal_dim: usize,
) -> ReductionResult<Genred> {
    let aliases = [
        format!("x = Vx({})", dim),
        format!("y = Vy({})", dim),
        format!("b = Vy({})", signal_dim),
        "g = Pm(1)".to_string(),
    ];
    let (formula, op) = match mode {
        KernelMode::Sum => (format!("{} * b", kernel.formula()), ReductionOp::Sum),
        KernelMode::Lse => (format!("{} + b", kernel.log_formula()), ReductionOp::LogSumExp),
    };
    Genred::new(&formula, &aliases, op, Axis::ReduceOverJ)
}

/// Convolve the signal `b` carried by `y` onto the points `x`.
pub fn kernel_product(
    x: &ArgTensor,
    y: &ArgTensor,
    b: &ArgTensor,
    gamma: f64,
    kernel: KernelKind,
    mode: KernelMode,
    backend: BackendMode,
) -> ReductionResult<ArgTensor> {
    if !(gamma.is_finite() && gamma > 0.0) {
        return Err(ReductionError::config(format!(
            "gamma must be positive, got {}",
            gamma
        )));
    }
    debug!(%kernel, ?mode, gamma, "kernel product");
    let op = kernel_operator(kernel, mode, x.cols(), b.cols())?.with_backend(backend);
    let g = ArgTensor::with_precision(Array2::from_elem((1, 1), gamma), x.precision());
    op.call(&[x.clone(), y.clone(), b.clone(), g])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use scirs2_core::ndarray::array;

    #[test]
    fn test_kernel_names() {
        for k in KernelKind::ALL {
            assert_eq!(k.name().parse::<KernelKind>().unwrap(), k);
        }
        assert_eq!("gaussian(x,y)".parse::<KernelKind>().unwrap(), KernelKind::Gaussian);
        assert!("sinc".parse::<KernelKind>().is_err());
        assert_eq!("LSE".parse::<KernelMode>().unwrap(), KernelMode::Lse);
    }

    #[test]
    fn test_kernels_at_zero_distance() {
        for k in KernelKind::ALL {
            assert_eq!(k.evaluate(2.0, 0.0), 1.0);
        }
    }

    #[test]
    fn test_gaussian_sum() {
        let x = ArgTensor::from_f64(array![[0.0]]);
        let y = ArgTensor::from_f64(array![[0.0], [1.0]]);
        let b = ArgTensor::from_f64(array![[1.0, 0.0], [0.0, 1.0]]);
        let out = kernel_product(&x, &y, &b, 0.5, KernelKind::Gaussian, KernelMode::Sum, BackendMode::Auto)
            .unwrap();
        assert_abs_diff_eq!(out.to_f64(), array![[1.0, (-0.5f64).exp()]], epsilon = 1e-12);
    }

    #[test]
    fn test_lse_matches_log_of_sum() {
        let x = ArgTensor::from_f64(array![[0.0, 1.0], [2.0, -1.0]]);
        let y = ArgTensor::from_f64(array![[0.5, 0.5], [1.0, 0.0], [-1.0, 2.0]]);
        let zeros = ArgTensor::from_f64(Array2::zeros((3, 1)));
        let ones = ArgTensor::from_f64(Array2::ones((3, 1)));
        for k in KernelKind::ALL {
            let lse = kernel_product(&x, &y, &zeros, 0.7, k, KernelMode::Lse, BackendMode::Auto)
                .unwrap()
                .to_f64();
            let sum = kernel_product(&x, &y, &ones, 0.7, k, KernelMode::Sum, BackendMode::Auto)
                .unwrap()
                .to_f64();
            assert_abs_diff_eq!(lse, sum.mapv(f64::ln), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_gamma() {
        let x = ArgTensor::from_f64(array![[0.0]]);
        let err = kernel_product(&x, &x, &x, -1.0, KernelKind::Cauchy, KernelMode::Sum, BackendMode::Auto);
        assert!(matches!(err, Err(ReductionError::Config(_))));
    }
}
