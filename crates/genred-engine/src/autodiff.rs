//! Gradients of reductions.
//!
//! The gradient of a reduction with respect to one of its arguments is itself
//! a Sum reduction: the upstream gradient (and, depending on the operator,
//! the forward output) is bound as an extra argument indexed by the surviving
//! index, the formula's vector-Jacobian product is built symbolically, and
//! the result is summed over whichever index the argument is not indexed by.
//!
//! | reduction | integrand                                             |
//! |-----------|-------------------------------------------------------|
//! | Sum       | `Grad(F, v, g)`                                       |
//! | Max/Min   | `Grad(F, v, g * Step(±(F - out)))`                    |
//! | LSE       | `Grad(F, v, g * Exp(F - out))`                        |
//! | SoftMax   | `Grad(K, v, p * <g, W - out>) + Grad(W, v, p * g)`    |
//! | ArgMax/ArgMin | zero                                              |
//!
//! with `p = Exp(K - LSE(K))`.

use scirs2_core::ndarray::{Array2, Axis as ArrayAxis};
use std::collections::HashMap;
use tracing::debug;

use genred_formula::{Category, Formula, UnaryOp, Variable};

use crate::binding::Binding;
use crate::engine::{ReductionCall, ReductionEngine};
use crate::error::{ReductionError, ReductionResult};
use crate::reduction::{ReductionDescriptor, ReductionOp};

// Not valid identifiers, so they never collide with a user alias.
const GRAD_IN: &str = "@grad_in";
const OUTPUT: &str = "@out";
const LOG_NORMALIZER: &str = "@lse";

/// Arguments bound next to the user's for the backward reductions.
struct Augmented {
    binding: Binding,
    grad_in: Formula,
    output: Option<Formula>,
    log_normalizer: Option<Formula>,
}

impl ReductionEngine {
    /// Gradients of `sum(upstream * call(binding))` with respect to the
    /// arguments at `wrt`.
    ///
    /// `output` is the forward result of the call and `upstream` the gradient
    /// flowing into it; both have one row per surviving index. Each returned
    /// gradient has the shape of the argument it belongs to.
    pub fn backward(
        &self,
        call: &ReductionCall,
        binding: &Binding,
        output: &Array2<f64>,
        upstream: &Array2<f64>,
        wrt: &[usize],
    ) -> ReductionResult<HashMap<usize, Array2<f64>>> {
        let out_dim = call.output_dim()?;
        let axis = call.descriptor.axis;
        let surviving = match axis.surviving() {
            Category::IndexedByI => binding.m(),
            _ => binding.n(),
        };
        for (name, array) in [(GRAD_IN, upstream), (OUTPUT, output)] {
            if array.dim() != (surviving, out_dim) {
                return Err(ReductionError::shape_mismatch(
                    name,
                    (Some(surviving), Some(out_dim)),
                    array.dim(),
                ));
            }
        }

        let mut grads = HashMap::with_capacity(wrt.len());
        let mut augmented: Option<Augmented> = None;
        for &position in wrt {
            let arg = binding.get(position).ok_or_else(|| {
                ReductionError::shape_mismatch(format!("#{}", position), (None, None), (0, 0))
            })?;
            let var = arg.var.clone();
            let shape = (arg.rows(), var.dim);

            let depends = call.formula.depends_on(&var)
                || call.formula2.as_ref().is_some_and(|w| w.depends_on(&var));
            if !depends || matches!(call.descriptor.op, ReductionOp::ArgMax | ReductionOp::ArgMin) {
                grads.insert(position, Array2::zeros(shape));
                continue;
            }

            if augmented.is_none() {
                augmented = Some(self.augment(call, binding, output, upstream)?);
            }
            let Some(aug) = augmented.as_ref() else {
                continue;
            };
            let integrand = integrand(call, aug, &var)?;
            debug!(
                variable = %var.name,
                nodes = integrand.node_count(),
                "gradient integrand"
            );

            let grad = match var.category {
                Category::Param => {
                    let per_row = self.reduce(
                        &integrand,
                        None,
                        ReductionDescriptor::sum(axis),
                        call.backend,
                        &aug.binding,
                    )?;
                    per_row.sum_axis(ArrayAxis(0)).insert_axis(ArrayAxis(0))
                }
                category => {
                    let grad_axis = if category == axis.surviving() {
                        axis
                    } else {
                        axis.flipped()
                    };
                    self.reduce(
                        &integrand,
                        None,
                        ReductionDescriptor::sum(grad_axis),
                        call.backend,
                        &aug.binding,
                    )?
                }
            };
            grads.insert(position, grad);
        }
        Ok(grads)
    }

    fn augment(
        &self,
        call: &ReductionCall,
        binding: &Binding,
        output: &Array2<f64>,
        upstream: &Array2<f64>,
    ) -> ReductionResult<Augmented> {
        let category = call.descriptor.axis.surviving();
        let (next, g) = binding.with_argument(GRAD_IN, category, upstream)?;
        let mut aug = Augmented {
            binding: next,
            grad_in: Formula::var(g),
            output: None,
            log_normalizer: None,
        };
        if call.descriptor.op != ReductionOp::Sum {
            let (next, o) = aug.binding.with_argument(OUTPUT, category, output)?;
            aug.binding = next;
            aug.output = Some(Formula::var(o));
        }
        if call.descriptor.op == ReductionOp::SoftMax {
            let lse = self.reduce(
                &call.formula,
                None,
                ReductionDescriptor::new(ReductionOp::LogSumExp, call.descriptor.axis),
                call.backend,
                binding,
            )?;
            let (next, l) = aug.binding.with_argument(LOG_NORMALIZER, category, &lse)?;
            aug.binding = next;
            aug.log_normalizer = Some(Formula::var(l));
        }
        Ok(aug)
    }
}

fn required(formula: &Option<Formula>, name: &str) -> ReductionResult<Formula> {
    formula
        .clone()
        .ok_or_else(|| ReductionError::dimension("Grad", format!("missing bound {}", name)))
}

fn integrand(call: &ReductionCall, aug: &Augmented, var: &Variable) -> ReductionResult<Formula> {
    let f = &call.formula;
    let g = aug.grad_in.clone();
    let h = match call.descriptor.op {
        ReductionOp::Sum => f.grad(var, &g)?,
        ReductionOp::Max | ReductionOp::Min => {
            let out = required(&aug.output, OUTPUT)?;
            let gap = if call.descriptor.op == ReductionOp::Max {
                Formula::sub(f.clone(), out)?
            } else {
                Formula::sub(out, f.clone())?
            };
            let mask = Formula::unary(UnaryOp::Step, gap)?;
            f.grad(var, &Formula::mul(g, mask)?)?
        }
        ReductionOp::LogSumExp => {
            let out = required(&aug.output, OUTPUT)?;
            let weight = Formula::exp(Formula::sub(f.clone(), out)?)?;
            f.grad(var, &Formula::mul(g, weight)?)?
        }
        ReductionOp::SoftMax => {
            let w = required(&call.formula2, "formula2")?;
            let out = required(&aug.output, OUTPUT)?;
            let lse = required(&aug.log_normalizer, LOG_NORMALIZER)?;
            let p = Formula::exp(Formula::sub(f.clone(), lse)?)?;
            let centered = Formula::scalprod(g.clone(), Formula::sub(w.clone(), out)?)?;
            let through_logits = f.grad(var, &Formula::mul(p.clone(), centered)?)?;
            let through_weights = w.grad(var, &Formula::mul(p, g)?)?;
            Formula::add(through_logits, through_weights)?
        }
        ReductionOp::ArgMax | ReductionOp::ArgMin => Formula::zero(var.dim),
    };
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduction::Axis;
    use crate::tensor::ArgTensor;
    use approx::assert_abs_diff_eq;
    use genred_formula::{parse, AliasTable};
    use scirs2_core::ndarray::array;

    fn setup() -> (AliasTable, Binding) {
        let aliases = AliasTable::parse(&["x = Vx(1)", "y = Vy(1)", "s = Pm(1)"]).unwrap();
        let binding = Binding::bind(
            &aliases,
            &[
                ArgTensor::from_f64(array![[0.5], [1.5]]),
                ArgTensor::from_f64(array![[1.0], [-1.0], [2.0]]),
                ArgTensor::from_f64(array![[2.0]]),
            ],
        )
        .unwrap();
        (aliases, binding)
    }

    #[test]
    fn test_sum_gradient_of_product() {
        let (aliases, binding) = setup();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("x * y", &aliases).unwrap(),
            ReductionDescriptor::sum(Axis::ReduceOverJ),
        );
        let out = engine.call(&call, &binding).unwrap();
        let ones = Array2::ones(out.raw_dim());
        let grads = engine.backward(&call, &binding, &out, &ones, &[0, 1]).unwrap();

        // d/dx_i sum_j x_i y_j = sum_j y_j
        assert_abs_diff_eq!(grads[&0], array![[2.0], [2.0]], epsilon = 1e-12);
        // d/dy_j sum_i x_i y_j = sum_i x_i
        assert_abs_diff_eq!(grads[&1], array![[2.0], [2.0], [2.0]], epsilon = 1e-12);
    }

    #[test]
    fn test_parameter_gradient_sums_everything() {
        let (aliases, binding) = setup();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("s * x", &aliases).unwrap(),
            ReductionDescriptor::sum(Axis::ReduceOverJ),
        );
        let out = engine.call(&call, &binding).unwrap();
        let ones = Array2::ones(out.raw_dim());
        let grads = engine.backward(&call, &binding, &out, &ones, &[2]).unwrap();
        // sum_i sum_j x_i = 3 * (0.5 + 1.5)
        assert_eq!(grads[&2].dim(), (1, 1));
        assert_abs_diff_eq!(grads[&2][[0, 0]], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_argmax_gradient_is_zero() {
        let (aliases, binding) = setup();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("x * y", &aliases).unwrap(),
            ReductionDescriptor::new(ReductionOp::ArgMax, Axis::ReduceOverJ),
        );
        let out = engine.call(&call, &binding).unwrap();
        let ones = Array2::ones(out.raw_dim());
        let grads = engine.backward(&call, &binding, &out, &ones, &[0, 1]).unwrap();
        assert!(grads[&0].iter().all(|&v| v == 0.0));
        assert_eq!(grads[&1].dim(), (3, 1));
    }

    #[test]
    fn test_max_gradient_routes_to_the_maximum() {
        let (aliases, binding) = setup();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("x * y", &aliases).unwrap(),
            ReductionDescriptor::new(ReductionOp::Max, Axis::ReduceOverJ),
        );
        let out = engine.call(&call, &binding).unwrap();
        let ones = Array2::ones(out.raw_dim());
        let grads = engine.backward(&call, &binding, &out, &ones, &[1]).unwrap();
        // The maximum over j is always attained at y = 2.
        assert_abs_diff_eq!(grads[&1], array![[0.0], [0.0], [2.0]], epsilon = 1e-12);
    }

    #[test]
    fn test_upstream_shape_is_checked() {
        let (aliases, binding) = setup();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("x * y", &aliases).unwrap(),
            ReductionDescriptor::sum(Axis::ReduceOverJ),
        );
        let out = engine.call(&call, &binding).unwrap();
        let wrong = Array2::ones((3, 1));
        let err = engine.backward(&call, &binding, &out, &wrong, &[0]).unwrap_err();
        assert!(matches!(err, ReductionError::ShapeMismatch(_)));
    }

    #[test]
    fn test_underscore_aliases_do_not_clash_with_bound_gradients() {
        let aliases =
            AliasTable::parse(&["_out = Vx(1)", "_lse = Vy(1)", "_grad_in = Pm(1)"]).unwrap();
        let binding = Binding::bind(
            &aliases,
            &[
                ArgTensor::from_f64(array![[0.5], [1.5]]),
                ArgTensor::from_f64(array![[1.0], [-1.0], [2.0]]),
                ArgTensor::from_f64(array![[0.3]]),
            ],
        )
        .unwrap();
        let engine = ReductionEngine::default();
        let call = ReductionCall::new(
            parse("_grad_in * _out * _lse", &aliases).unwrap(),
            ReductionDescriptor::new(ReductionOp::SoftMax, Axis::ReduceOverJ),
        )
        .with_formula2(parse("_lse", &aliases).unwrap());
        let out = engine.call(&call, &binding).unwrap();
        let ones = Array2::ones(out.raw_dim());
        let grads = engine
            .backward(&call, &binding, &out, &ones, &[0, 1, 2])
            .unwrap();
        assert_eq!(grads[&0].dim(), (2, 1));
        assert_eq!(grads[&1].dim(), (3, 1));
        assert_eq!(grads[&2].dim(), (1, 1));
    }
}
