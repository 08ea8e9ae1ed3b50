//! Reusable reduction operators.

use std::sync::Arc;
use tracing::debug_span;

use genred_engine::{
    ArgTensor, Axis, BackendMode, Binding, ReductionCall, ReductionDescriptor, ReductionEngine,
    ReductionError, ReductionOp, ReductionResult,
};
use genred_formula::{parse, AliasTable, Formula, FormulaError};

/// A parsed reduction that can be called repeatedly on new arguments.
///
/// ```
/// use genred::{ArgTensor, Axis, Genred, ReductionOp};
/// use scirs2_core::ndarray::array;
///
/// let softmax = Genred::new("SqDist(x,y)", &["x = Vx(1)", "y = Vy(1)", "b = Vy(1)"], ReductionOp::SoftMax, Axis::ReduceOverJ)
///     .unwrap()
///     .with_formula2("b")
///     .unwrap();
/// let out = softmax
///     .call(&[
///         ArgTensor::from_f64(array![[0.0]]),
///         ArgTensor::from_f64(array![[0.0], [0.0]]),
///         ArgTensor::from_f64(array![[1.0], [3.0]]),
///     ])
///     .unwrap();
/// assert_eq!(out.to_f64(), array![[2.0]]);
/// ```
#[derive(Clone)]
pub struct Genred {
    aliases: AliasTable,
    call: ReductionCall,
    engine: Arc<ReductionEngine>,
}

impl Genred {
    pub fn new<S: AsRef<str>>(
        formula: &str,
        aliases: &[S],
        op: ReductionOp,
        axis: Axis,
    ) -> ReductionResult<Self> {
        let aliases = AliasTable::parse(aliases)?;
        let formula = parse(formula, &aliases)?;
        Ok(Self {
            aliases,
            call: ReductionCall::new(formula, ReductionDescriptor::new(op, axis)),
            engine: Arc::new(ReductionEngine::default()),
        })
    }

    /// Weight formula for SoftMax.
    pub fn with_formula2(mut self, formula2: &str) -> ReductionResult<Self> {
        self.call.formula2 = Some(parse(formula2, &self.aliases)?);
        Ok(self)
    }

    pub fn with_backend(mut self, backend: BackendMode) -> Self {
        self.call.backend = Some(backend);
        self
    }

    /// Run on a shared engine (and its plan cache).
    pub fn with_engine(mut self, engine: Arc<ReductionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn formula(&self) -> &Formula {
        &self.call.formula
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn descriptor(&self) -> ReductionDescriptor {
        self.call.descriptor
    }

    pub fn engine(&self) -> &Arc<ReductionEngine> {
        &self.engine
    }

    /// Output dimension, or the error a call would fail with.
    pub fn output_dim(&self) -> ReductionResult<usize> {
        self.call.output_dim()
    }

    /// Reduce `args`, given in position order.
    pub fn call(&self, args: &[ArgTensor]) -> ReductionResult<ArgTensor> {
        self.engine.reduce_args(
            &self.call.formula,
            self.call.formula2.as_ref(),
            self.call.descriptor,
            self.call.backend,
            &self.aliases,
            args,
        )
    }

    /// Gradients of `sum(upstream * self.call(args))` with respect to the
    /// named arguments, in the order of `wrt` and the arguments' precision.
    pub fn gradient(
        &self,
        args: &[ArgTensor],
        upstream: &ArgTensor,
        wrt: &[&str],
    ) -> ReductionResult<Vec<ArgTensor>> {
        let span = debug_span!("backward", op = %self.call.descriptor.op);
        let _guard = span.enter();

        let binding = Binding::bind(&self.aliases, args)?;
        let positions = wrt
            .iter()
            .map(|name| {
                self.aliases
                    .get(name)
                    .map(|v| v.position)
                    .ok_or_else(|| FormulaError::UnknownVariable {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // A name listed twice gets the same gradient twice.
        let mut distinct = positions.clone();
        distinct.sort_unstable();
        distinct.dedup();

        let output = self.engine.call(&self.call, &binding)?;
        let grads =
            self.engine
                .backward(&self.call, &binding, &output, &upstream.to_f64(), &distinct)?;
        positions
            .iter()
            .map(|p| {
                grads
                    .get(p)
                    .map(|g| ArgTensor::with_precision(g.clone(), binding.precision()))
                    .ok_or_else(|| ReductionError::config(format!("no gradient for #{}", p)))
            })
            .collect()
    }
}

impl std::fmt::Debug for Genred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Genred")
            .field("formula", &self.call.formula.to_string())
            .field("descriptor", &self.call.descriptor)
            .field("backend", &self.call.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use genred_engine::Precision;
    use scirs2_core::ndarray::{array, Array2};

    #[test]
    fn test_unknown_operator_fails_at_construction() {
        let err = Genred::new("Frob(x)", &["x = Vx(1)"], ReductionOp::Sum, Axis::ReduceOverJ)
            .unwrap_err();
        assert!(matches!(
            err,
            ReductionError::Formula(FormulaError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_f32_in_f32_out() {
        let op = Genred::new("x * y", &["x = Vx(1)", "y = Vy(1)"], ReductionOp::Sum, Axis::ReduceOverJ)
            .unwrap();
        let out = op
            .call(&[
                ArgTensor::from_f32(array![[1.0f32], [2.0]]),
                ArgTensor::from_f32(array![[3.0f32], [4.0]]),
            ])
            .unwrap();
        assert_eq!(out.precision(), Precision::F32);
        assert_eq!(out.as_f32().unwrap(), &array![[7.0f32], [14.0]]);
    }

    #[test]
    fn test_gradient_by_name() {
        let op = Genred::new(
            "SqDist(x, y)",
            &["x = Vx(2)", "y = Vy(2)"],
            ReductionOp::Sum,
            Axis::ReduceOverJ,
        )
        .unwrap();
        let args = [
            ArgTensor::from_f64(array![[1.0, 0.0]]),
            ArgTensor::from_f64(array![[0.0, 0.0], [0.0, 2.0]]),
        ];
        let grads = op
            .gradient(&args, &ArgTensor::from_f64(Array2::ones((1, 1))), &["x", "y"])
            .unwrap();
        // d/dx sum_j |x - y_j|^2 = 2 sum_j (x - y_j)
        assert_abs_diff_eq!(grads[0].to_f64(), array![[4.0, -4.0]], epsilon = 1e-12);
        assert_abs_diff_eq!(
            grads[1].to_f64(),
            array![[-2.0, 0.0], [-2.0, 4.0]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gradient_unknown_name() {
        let op = Genred::new("x", &["x = Vx(1)"], ReductionOp::Sum, Axis::ReduceOverJ).unwrap();
        let args = [ArgTensor::from_f64(array![[1.0]])];
        let err = op
            .gradient(&args, &ArgTensor::from_f64(array![[1.0]]), &["z"])
            .unwrap_err();
        assert!(matches!(
            err,
            ReductionError::Formula(FormulaError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_gradient_repeated_name() {
        let op = Genred::new("x * y", &["x = Vx(1)", "y = Vy(1)"], ReductionOp::Sum, Axis::ReduceOverJ)
            .unwrap();
        let args = [
            ArgTensor::from_f64(array![[1.0], [2.0]]),
            ArgTensor::from_f64(array![[3.0], [4.0]]),
        ];
        let grads = op
            .gradient(&args, &ArgTensor::from_f64(Array2::ones((2, 1))), &["y", "x", "y"])
            .unwrap();
        assert_eq!(grads.len(), 3);
        assert_eq!(grads[0].to_f64(), array![[3.0], [3.0]]);
        assert_eq!(grads[1].to_f64(), array![[7.0], [7.0]]);
        assert_eq!(grads[2], grads[0]);
    }
}
