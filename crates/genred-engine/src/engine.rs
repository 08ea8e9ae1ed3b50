//! The reduction engine.
//!
//! [`ReductionEngine`] owns the configuration, the host capabilities and the
//! plan cache. A call validates everything up front (reduction against the
//! formula dimensions, backend against the host, formula against the
//! binding), picks a backend and runs it. Reductions over `i` are executed as
//! reductions over `j` of the transposed formula and binding.

use scirs2_core::ndarray::{Array2, Array3};
use std::sync::Arc;
use tracing::{debug, debug_span};

use genred_formula::{AliasTable, Formula};

use crate::backend::materialize;
use crate::binding::Binding;
use crate::cache::{CompiledPlan, PlanCache};
use crate::config::EngineConfig;
use crate::device::DeviceCapability;
use crate::dispatch::{negotiate, select, BackendKind, BackendMode, TileSizes};
use crate::error::{ReductionError, ReductionResult, ShapeMismatchError};
use crate::reduction::{Axis, ReductionDescriptor};
use crate::tensor::ArgTensor;

/// A formula pair with its reduction and backend choice.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionCall {
    pub formula: Formula,
    /// Weight formula, read by SoftMax only
    pub formula2: Option<Formula>,
    pub descriptor: ReductionDescriptor,
    /// `None` uses the engine's configured mode
    pub backend: Option<BackendMode>,
}

impl ReductionCall {
    pub fn new(formula: Formula, descriptor: ReductionDescriptor) -> Self {
        Self {
            formula,
            formula2: None,
            descriptor,
            backend: None,
        }
    }

    pub fn with_formula2(mut self, formula2: Formula) -> Self {
        self.formula2 = Some(formula2);
        self
    }

    pub fn with_backend(mut self, backend: BackendMode) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Output dimension, or the error the call would fail with.
    pub fn output_dim(&self) -> ReductionResult<usize> {
        self.descriptor
            .validate(self.formula.dim(), self.formula2.as_ref().map(Formula::dim))
    }
}

/// Everything needed to run one reduction over `j`.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub compiled: Arc<CompiledPlan>,
    pub kind: BackendKind,
    pub tiles: TileSizes,
    /// The call reduces over `i` and runs on the transposed problem
    pub transposed: bool,
}

pub struct ReductionEngine {
    config: EngineConfig,
    capability: DeviceCapability,
    cache: Arc<PlanCache>,
    #[cfg(feature = "parallel")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl ReductionEngine {
    pub fn new(config: EngineConfig) -> ReductionResult<Self> {
        let mut capability = DeviceCapability::detect();
        if let Some(workers) = config.workers {
            capability = capability.with_workers(workers);
        }

        #[cfg(feature = "parallel")]
        let pool = match config.workers {
            Some(workers) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| ReductionError::config(format!("thread pool: {}", e)))?,
            )),
            None => None,
        };

        Ok(Self {
            config,
            capability,
            cache: Arc::new(PlanCache::new()),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Override the detected capabilities.
    pub fn with_capability(mut self, capability: DeviceCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Share a plan cache with other engines.
    pub fn with_cache(mut self, cache: Arc<PlanCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capability(&self) -> &DeviceCapability {
        &self.capability
    }

    pub fn cache(&self) -> &Arc<PlanCache> {
        &self.cache
    }

    /// Validate a call and build its execution plan.
    ///
    /// Returns the plan together with the binding it runs on, transposed
    /// when the reduction is over `i`.
    pub fn prepare(
        &self,
        formula: &Formula,
        formula2: Option<&Formula>,
        descriptor: ReductionDescriptor,
        backend: Option<BackendMode>,
        binding: &Binding,
    ) -> ReductionResult<(ExecutionPlan, Binding)> {
        descriptor.validate(formula.dim(), formula2.map(Formula::dim))?;
        let requested = backend.unwrap_or(self.config.backend);
        let negotiated = negotiate(requested, &self.capability, binding.residency())?;

        let transposed = descriptor.axis == Axis::ReduceOverI;
        let (formula, formula2, binding) = if transposed {
            (
                formula.transposed(),
                formula2.map(Formula::transposed),
                binding.transposed(),
            )
        } else {
            (formula.clone(), formula2.cloned(), binding.clone())
        };

        if binding.n() == 0 && descriptor.op.requires_nonempty() {
            let reduced = binding
                .iter()
                .find(|a| a.var.category == genred_formula::Category::IndexedByJ)
                .map_or_else(|| "reduced axis".to_string(), |a| a.var.name.clone());
            return Err(ReductionError::ShapeMismatch(
                ShapeMismatchError::new(reduced, (None, None), (0, 0)).with_context(format!(
                    "{} has no value over an empty reduced axis",
                    descriptor.op
                )),
            ));
        }

        let compiled = if self.config.cache_plans {
            self.cache.get_or_compile(
                &formula,
                formula2.as_ref(),
                binding.precision(),
                self.capability.device,
            )
        } else {
            Arc::new(CompiledPlan::compile(&formula, formula2.as_ref()))
        };
        compiled.check(&binding)?;

        let kind = select(
            binding.m(),
            binding.n(),
            compiled.program.dim(),
            &self.capability,
            negotiated.mode,
            &self.config.tiles,
        );
        Ok((
            ExecutionPlan {
                compiled,
                kind,
                tiles: self.config.tiles,
                transposed,
            },
            binding,
        ))
    }

    /// Reduce a bound formula. The result has one row per surviving index.
    pub fn reduce(
        &self,
        formula: &Formula,
        formula2: Option<&Formula>,
        descriptor: ReductionDescriptor,
        backend: Option<BackendMode>,
        binding: &Binding,
    ) -> ReductionResult<Array2<f64>> {
        let span = debug_span!("reduce", op = %descriptor.op, axis = ?descriptor.axis);
        let _guard = span.enter();

        let (plan, binding) = self.prepare(formula, formula2, descriptor, backend, binding)?;
        debug!(
            backend = %plan.kind,
            m = binding.m(),
            n = binding.n(),
            out_dim = plan.compiled.output_dim(),
            "running reduction"
        );
        Ok(self.execute(&plan, &binding, descriptor))
    }

    /// Reduce a [`ReductionCall`] on a binding.
    pub fn call(&self, call: &ReductionCall, binding: &Binding) -> ReductionResult<Array2<f64>> {
        self.reduce(
            &call.formula,
            call.formula2.as_ref(),
            call.descriptor,
            call.backend,
            binding,
        )
    }

    /// Run a prepared plan.
    pub fn execute(
        &self,
        plan: &ExecutionPlan,
        binding: &Binding,
        descriptor: ReductionDescriptor,
    ) -> Array2<f64> {
        let backend = plan.tiles.backend(plan.kind);
        let run = || backend.reduce(&plan.compiled, binding, descriptor.op);

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(run);
        }
        run()
    }

    /// Bind `args`, reduce, and return the result in the arguments' precision
    /// and residency.
    #[allow(clippy::too_many_arguments)]
    pub fn reduce_args(
        &self,
        formula: &Formula,
        formula2: Option<&Formula>,
        descriptor: ReductionDescriptor,
        backend: Option<BackendMode>,
        aliases: &AliasTable,
        args: &[ArgTensor],
    ) -> ReductionResult<ArgTensor> {
        let binding = Binding::bind(aliases, args)?;
        let out = self.reduce(formula, formula2, descriptor, backend, &binding)?;
        let tensor = ArgTensor::with_precision(out, binding.precision());
        Ok(match binding.residency().device() {
            Some(device) => tensor.on_device(device),
            None => tensor,
        })
    }

    /// The full `(M, N, D)` table of formula values.
    pub fn pairwise(&self, formula: &Formula, binding: &Binding) -> ReductionResult<Array3<f64>> {
        let compiled = CompiledPlan::compile(formula, None);
        compiled.check(binding)?;
        materialize(&compiled.program, binding)
    }
}

impl Default for ReductionEngine {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            capability: DeviceCapability::detect(),
            cache: Arc::new(PlanCache::new()),
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }
}
